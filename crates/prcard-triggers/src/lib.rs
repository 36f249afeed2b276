//! prcard Triggers - webhook intake and card delivery
//!
//! This crate wires the network-facing half of the relay:
//!
//! - **platforms**: GitHub (signature check, payload parse, files API) and
//!   Feishu/Lark (tenant tokens, card create/update) adapters
//! - **credential**: the process-wide access token cache
//! - **handler**: [`EventRelay`], the per-delivery pipeline
//! - **server**: the axum HTTP surface
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prcard_store::{MessageIndex, TokenFile};
//! use prcard_triggers::{
//!     AppCredentials, CredentialCache, EventRelay, FeishuConfig, FeishuPlatform, GitHubConfig,
//!     GitHubPlatform, RelayServer,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let github = Arc::new(GitHubPlatform::new(GitHubConfig::default())?);
//! let feishu = Arc::new(FeishuPlatform::new(FeishuConfig {
//!     app_id: "cli_xxx".into(),
//!     app_secret: "secret".into(),
//!     chat_id: "oc_xxx".into(),
//!     api_url: "https://open.feishu.cn".into(),
//!     timeout_secs: 10,
//! })?);
//!
//! let credentials = Arc::new(CredentialCache::load(feishu.clone(), TokenFile::new(".feishu_token")).await);
//! let index = MessageIndex::open(".pr_message_map", 50).await?;
//! let app = AppCredentials { app_id: "cli_xxx".into(), app_secret: "secret".into() };
//!
//! let relay = Arc::new(EventRelay::new(github, feishu, credentials, index, app));
//! RelayServer::new(relay).serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod handler;
pub mod platforms;
pub mod server;

pub use credential::CredentialCache;
pub use handler::{AppCredentials, EventRelay, RelayOutcome, DIFF_FETCH_FAILED};
pub use platforms::{
    CardSink, DiffSource, FeishuConfig, FeishuPlatform, GitHubConfig, GitHubPlatform,
    IssuedToken, PlatformError, TokenSource,
};
pub use server::{router, AppState, RelayServer, RelayServerConfig};
