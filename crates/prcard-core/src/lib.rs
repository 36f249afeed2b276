// prcard Core - Foundation types for the PR card relay
//
// This crate holds everything that does not touch the network or the disk:
// the typed pull-request event, card classification and rendering, the
// diff-statistics heuristic and the shared error taxonomy.

pub mod card;
pub mod diffstat;
pub mod error;
pub mod event;

// Re-export core types
pub use card::{
    build_pr_card, build_test_card, Card, CardButton, CardElement, CardHeader, CardText, CardType,
};
pub use diffstat::{
    aggregate, render_entries, summarize, ChangedFile, DiffStatEntry, DiffSummary,
    NO_CHANGES_MARKER,
};
pub use error::{RelayError, RelayResult};
pub use event::{PrAction, PullRequestEvent};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of PR -> message mappings kept by the index
pub const DEFAULT_MAX_MAPPINGS: usize = 50;

/// Default safety margin (seconds) subtracted from token lifetimes
pub const DEFAULT_TOKEN_BUFFER_SECS: i64 = 100;
