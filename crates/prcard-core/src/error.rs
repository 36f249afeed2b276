//! Error taxonomy shared by every prcard crate
//!
//! Each variant maps to exactly one HTTP status so the server boundary never
//! has to guess how a failure should be reported.

use thiserror::Error;

/// Result alias used across the relay
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors raised while relaying a webhook delivery
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound signature missing or wrong
    #[error("Invalid signature: {0}")]
    Unauthorized(String),

    /// Payload missing, malformed or lacking a required field
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The chat platform refused to issue an access token
    #[error("Failed to obtain access token: {0}")]
    UpstreamAuth(String),

    /// The diff source could not be read. Masked with a placeholder by the relay.
    #[error("Failed to fetch PR files: {0}")]
    UpstreamFetch(String),

    /// The chat platform rejected the card
    #[error("Failed to deliver card: {0}")]
    UpstreamSend(String),

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn upstream_auth(msg: impl Into<String>) -> Self {
        Self::UpstreamAuth(msg.into())
    }

    pub fn upstream_fetch(msg: impl Into<String>) -> Self {
        Self::UpstreamFetch(msg.into())
    }

    pub fn upstream_send(msg: impl Into<String>) -> Self {
        Self::UpstreamSend(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status code reported to the webhook sender
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::BadRequest(_) => 400,
            Self::UpstreamAuth(_)
            | Self::UpstreamFetch(_)
            | Self::UpstreamSend(_)
            | Self::Storage(_)
            | Self::Config(_) => 500,
        }
    }

    /// Message carried by the variant, without the category prefix
    pub fn detail(&self) -> &str {
        match self {
            Self::Unauthorized(msg)
            | Self::BadRequest(msg)
            | Self::UpstreamAuth(msg)
            | Self::UpstreamFetch(msg)
            | Self::UpstreamSend(msg)
            | Self::Storage(msg)
            | Self::Config(msg) => msg,
        }
    }

    /// Whether the failure was caused by the caller rather than by us or an upstream
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
