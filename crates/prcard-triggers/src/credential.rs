//! Tenant access token cache
//!
//! Keeps one access token alive across requests and restarts. The token is
//! loaded from its file at startup, served from memory while it is inside its
//! validity window, and refreshed from the [`TokenSource`] otherwise.
//!
//! The read-check-refresh-write sequence runs under one async mutex, so
//! concurrent deliveries never issue redundant token requests.

use std::sync::Arc;

use chrono::Utc;
use prcard_core::{RelayError, RelayResult, DEFAULT_TOKEN_BUFFER_SECS};
use prcard_store::{CachedToken, TokenFile};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::platforms::TokenSource;

pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    file: TokenFile,
    buffer_secs: i64,
    cached: Mutex<Option<CachedToken>>,
}

impl CredentialCache {
    /// Build the cache and load any token persisted by a previous run
    pub async fn load(source: Arc<dyn TokenSource>, file: TokenFile) -> Self {
        let cached = file.load().await;
        if cached.is_some() {
            debug!("Loaded cached access token from {}", file.path().display());
        }

        Self {
            source,
            file,
            buffer_secs: DEFAULT_TOKEN_BUFFER_SECS,
            cached: Mutex::new(cached),
        }
    }

    /// Override the safety margin applied to token lifetimes
    pub fn with_buffer_secs(mut self, buffer_secs: i64) -> Self {
        self.buffer_secs = buffer_secs.max(0);
        self
    }

    /// Return a valid token, refreshing it first if needed.
    ///
    /// A refreshed token expires at `now + ttl - buffer`. Failing to persist
    /// it is logged and otherwise ignored.
    pub async fn get_token(&self, app_id: &str, app_secret: &str) -> RelayResult<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(now, self.buffer_secs) {
                debug!("Using cached access token");
                return Ok(token.token.clone());
            }
        }

        let issued = self
            .source
            .request_token(app_id, app_secret)
            .await
            .map_err(|e| RelayError::upstream_auth(e.to_string()))?;

        let token = CachedToken::new(issued.token, now + issued.expires_in - self.buffer_secs);
        info!("Refreshed access token, valid until {}", token.expires_at);

        if let Err(e) = self.file.save(&token).await {
            error!("Failed to persist access token: {}", e);
        }

        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the in-memory token so the next call refreshes.
    ///
    /// Called when the chat platform reports the token revoked or expired
    /// before its recorded expiry.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::{IssuedToken, PlatformError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingSource {
        calls: AtomicUsize,
        ttl: i64,
        fail: bool,
    }

    impl CountingSource {
        fn new(ttl: i64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                ttl,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                ttl: 0,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn request_token(
            &self,
            _app_id: &str,
            _app_secret: &str,
        ) -> Result<IssuedToken, PlatformError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(PlatformError::ApiError {
                    code: 10003,
                    msg: "invalid app_secret".to_string(),
                });
            }
            Ok(IssuedToken {
                token: format!("t-{}", n),
                expires_in: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(7200);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(dir.path().join("tok"))).await;

        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-1");
        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_persists_with_margin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tok");
        let cache = CredentialCache::load(CountingSource::new(7200), TokenFile::new(&path)).await;

        let before = Utc::now().timestamp();
        cache.get_token("id", "secret").await.unwrap();
        let after = Utc::now().timestamp();

        let saved = TokenFile::new(&path).load().await.unwrap();
        assert_eq!(saved.token, "t-1");
        assert!(saved.expires_at >= before + 7200 - 100);
        assert!(saved.expires_at <= after + 7200 - 100);
    }

    #[tokio::test]
    async fn test_persisted_token_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tok");
        let expires_at = Utc::now().timestamp() + 3600;
        TokenFile::new(&path)
            .save(&CachedToken::new("t-persisted", expires_at))
            .await
            .unwrap();

        let source = CountingSource::new(7200);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(&path)).await;

        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-persisted");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_inside_buffer_is_refreshed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tok");
        TokenFile::new(&path)
            .save(&CachedToken::new("t-stale", Utc::now().timestamp() + 50))
            .await
            .unwrap();

        let source = CountingSource::new(7200);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(&path)).await;

        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_short_ttl_is_not_cached() {
        // ttl below twice the buffer never enters the validity window
        let dir = tempdir().unwrap();
        let source = CountingSource::new(150);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(dir.path().join("tok"))).await;

        cache.get_token("id", "secret").await.unwrap();
        cache.get_token("id", "secret").await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_source_failure_is_upstream_auth() {
        let dir = tempdir().unwrap();
        let cache = CredentialCache::load(CountingSource::failing(), TokenFile::new(dir.path().join("tok"))).await;

        let err = cache.get_token("id", "bad").await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamAuth(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tok");
        std::fs::create_dir(dir.path().join("tok.tmp")).unwrap();

        let source = CountingSource::new(7200);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(&path)).await;

        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-1");
        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(7200);
        let cache = CredentialCache::load(source.clone(), TokenFile::new(dir.path().join("tok"))).await;

        cache.get_token("id", "secret").await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get_token("id", "secret").await.unwrap(), "t-2");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(7200);
        let cache = Arc::new(
            CredentialCache::load(source.clone(), TokenFile::new(dir.path().join("tok"))).await,
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token("id", "secret").await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "t-1");
        }
        assert_eq!(source.calls(), 1);
    }
}
