//! Typed pull-request event
//!
//! A `PullRequestEvent` is an immutable snapshot of one webhook delivery,
//! produced by the GitHub adapter's strict parse step. Nothing downstream
//! reaches into raw JSON.

use serde::{Deserialize, Serialize};

use crate::card::CardType;

/// Pull request action carried in the `action` field of the payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Synchronize,
    Reopened,
    Edited,
    Closed,
    /// Any action we do not notify on (labeled, assigned, review_requested, ...)
    #[serde(untagged)]
    Other(String),
}

impl PrAction {
    /// Whether this action produces (or refreshes) a card
    pub fn is_notifiable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Synchronize => "synchronize",
            Self::Reopened => "reopened",
            Self::Edited => "edited",
            Self::Closed => "closed",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for PrAction {
    fn from(s: &str) -> Self {
        match s {
            "opened" => Self::Opened,
            "synchronize" => Self::Synchronize,
            "reopened" => Self::Reopened,
            "edited" => Self::Edited,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for PrAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pull-request webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PrAction,

    /// Repository full name (`owner/repo`)
    pub repository: String,

    pub number: u64,

    pub title: String,

    /// Browser URL of the pull request
    pub html_url: String,

    /// Login of the PR author
    pub author: String,

    pub merged: bool,

    /// Logins of the currently requested reviewers
    pub requested_reviewers: Vec<String>,

    /// Login of the user that triggered this delivery (the merger for merges)
    pub sender: String,
}

impl PullRequestEvent {
    /// Card variant for this event
    pub fn card_type(&self) -> CardType {
        CardType::classify(&self.action, self.merged)
    }

    /// Short human label, e.g. `owner/repo#7`
    pub fn display_key(&self) -> String {
        format!("{}#{}", self.repository, self.number)
    }
}
