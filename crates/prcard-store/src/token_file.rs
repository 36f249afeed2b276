//! Persisted access token
//!
//! Stores the last tenant access token with its absolute expiry so a restart
//! does not force a fresh token request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreResult;
use crate::file::{ensure_parent, read_json, write_json_atomic};

/// Token plus absolute expiry in unix seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    #[serde(rename = "tenant_access_token")]
    pub token: String,

    #[serde(rename = "expire_at", default)]
    pub expires_at: i64,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Usable at `now` only if it outlives `now + buffer_secs`
    pub fn is_valid_at(&self, now: i64, buffer_secs: i64) -> bool {
        !self.token.is_empty() && now + buffer_secs < self.expires_at
    }
}

/// JSON file holding one `CachedToken`
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the cached token. Missing or unreadable files yield `None`.
    pub async fn load(&self) -> Option<CachedToken> {
        match read_json::<CachedToken>(&self.path).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Ignoring unreadable token cache: {}", e);
                None
            }
        }
    }

    /// Replace the cached token
    pub async fn save(&self, token: &CachedToken) -> StoreResult<()> {
        ensure_parent(&self.path).await?;
        write_json_atomic(&self.path, token).await
    }

    /// Get the file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
