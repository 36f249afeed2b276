//! Platform adapters
//!
//! The relay talks to two external systems: GitHub (inbound webhooks plus the
//! pull-request files API) and Feishu/Lark (access tokens and interactive
//! cards). Each outbound concern sits behind a small trait so the relay can
//! be driven by fakes in tests.

use async_trait::async_trait;
use prcard_core::{Card, ChangedFile};
use thiserror::Error;

pub mod feishu;
pub mod github;

pub use feishu::{FeishuConfig, FeishuPlatform};
pub use github::{GitHubConfig, GitHubPlatform};

/// Platform-specific errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success HTTP status
    #[error("{status} {}: {body}", status_reason(.status))]
    Status { status: u16, body: String },

    /// Well-formed response carrying a non-zero application code
    #[error("API error code {code}: {msg}")]
    ApiError { code: i64, msg: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlatformError {
    /// Whether the chat platform refused the access token rather than the request
    pub fn is_token_rejected(&self) -> bool {
        matches!(self, Self::ApiError { code, .. } if feishu::TOKEN_REJECTED_CODES.contains(code))
    }
}

fn status_reason(status: &u16) -> &'static str {
    reqwest::StatusCode::from_u16(*status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        PlatformError::Http(err.to_string())
    }
}

/// Access token issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime in seconds, relative to the moment of issue
    pub expires_in: i64,
}

/// Source of the changed-file list for a pull request
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn changed_files(
        &self,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<ChangedFile>, PlatformError>;
}

/// Identity provider issuing tenant access tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn request_token(
        &self,
        app_id: &str,
        app_secret: &str,
    ) -> Result<IssuedToken, PlatformError>;
}

/// Chat destination for cards
#[async_trait]
pub trait CardSink: Send + Sync {
    /// Post a new card and return its message id
    async fn create_card(&self, token: &str, card: &Card) -> Result<String, PlatformError>;

    /// Replace the content of an existing card
    async fn update_card(
        &self,
        token: &str,
        message_id: &str,
        card: &Card,
    ) -> Result<(), PlatformError>;
}
