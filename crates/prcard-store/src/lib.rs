//! prcard Store - persisted state that survives relay restarts
//!
//! Two small JSON files back the relay:
//!
//! - **MessageIndex**: bounded log mapping `owner/repo#number` to the chat
//!   message that currently represents the pull request
//! - **TokenFile**: the last issued access token and its absolute expiry
//!
//! Both files are safe to delete. Losing them only means the next delivery
//! creates a fresh card or requests a fresh token.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use prcard_store::{MessageIndex, TokenFile};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = MessageIndex::open("./.pr_message_map", 50).await?;
//! if index.lookup("owner/repo", 7).await.is_none() {
//!     index.record("owner/repo", 7, "om_123").await?;
//! }
//!
//! let tokens = TokenFile::new("./.feishu_token");
//! let cached = tokens.load().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod file;
pub mod message_index;
pub mod token_file;

pub use error::{StoreError, StoreResult};
pub use message_index::MessageIndex;
pub use token_file::{CachedToken, TokenFile};
