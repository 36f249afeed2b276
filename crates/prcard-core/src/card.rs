//! Interactive card model and builders
//!
//! Cards follow the Feishu/Lark interactive message schema: a coloured header
//! plus a markdown body and a single "View PR" button. Builders are pure;
//! serialization into the `content` string happens at the platform edge.

use serde::{Deserialize, Serialize};

use crate::event::{PrAction, PullRequestEvent};

/// Card variant, derived from the event's action and merged flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Open,
    Merged,
    Closed,
}

impl CardType {
    /// `closed` splits on the merged flag; everything else (including
    /// `reopened`) shows as open.
    pub fn classify(action: &PrAction, merged: bool) -> Self {
        match action {
            PrAction::Closed if merged => Self::Merged,
            PrAction::Closed => Self::Closed,
            _ => Self::Open,
        }
    }

    /// Header colour template
    pub fn template(&self) -> &'static str {
        match self {
            Self::Open => "blue",
            Self::Merged => "green",
            Self::Closed => "grey",
        }
    }

    /// Header title suffix
    pub fn title(&self) -> &'static str {
        match self {
            Self::Open => "New Pull Request",
            Self::Merged => "PR Merged",
            Self::Closed => "PR Closed",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Text node (`plain_text` or `lark_md`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardText {
    pub tag: String,
    pub content: String,
}

impl CardText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            tag: "plain_text".to_string(),
            content: content.into(),
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            tag: "lark_md".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardHeader {
    pub template: String,
    pub title: CardText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardButton {
    pub tag: String,
    pub text: CardText,
    #[serde(rename = "type")]
    pub button_type: String,
    pub url: String,
}

impl CardButton {
    pub fn primary_link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            tag: "button".to_string(),
            text: CardText::plain(label),
            button_type: "primary".to_string(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum CardElement {
    Div { text: CardText },
    Action { actions: Vec<CardButton> },
}

/// Interactive card payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub header: CardHeader,
    pub elements: Vec<CardElement>,
}

impl Card {
    /// Serialize into the string carried in a message's `content` field
    pub fn to_content(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn header_title(&self) -> &str {
        &self.header.title.content
    }

    /// Markdown body of the first div, if any
    pub fn body(&self) -> Option<&str> {
        self.elements.iter().find_map(|element| match element {
            CardElement::Div { text } => Some(text.content.as_str()),
            _ => None,
        })
    }
}

/// Build the card for a pull-request event
///
/// `diff_stats` is the rendered directory summary, or a placeholder when the
/// file list could not be fetched.
pub fn build_pr_card(event: &PullRequestEvent, card_type: CardType, diff_stats: &str) -> Card {
    let reviewers = if event.requested_reviewers.is_empty() {
        "none assigned".to_string()
    } else {
        event.requested_reviewers.join(", ")
    };

    let mut lines = vec![
        format!("**{}**", event.title),
        String::new(),
        diff_stats.to_string(),
        String::new(),
        format!("**Author**: {}", event.author),
        format!("**Reviewer**: {}", reviewers),
    ];
    if card_type == CardType::Merged {
        lines.push(format!("**Merged by**: {}", event.sender));
    }

    Card {
        header: CardHeader {
            template: card_type.template().to_string(),
            title: CardText::plain(format!("{}: {}", event.repository, card_type.title())),
        },
        elements: vec![
            CardElement::Div {
                text: CardText::markdown(lines.join("\n")),
            },
            CardElement::Action {
                actions: vec![CardButton::primary_link("View PR", &event.html_url)],
            },
        ],
    }
}

/// Build the connectivity test card sent by `POST /test` and `prcardctl test-card`
pub fn build_test_card(sent_at: &str, port: u16, health_url: &str) -> Card {
    let body = format!(
        "**Service test message**\n\n**Status**: running\n**Sent at**: {}\n**Port**: {}\n\nThis message verifies that the bot can post to this chat.",
        sent_at, port
    );

    Card {
        header: CardHeader {
            template: "green".to_string(),
            title: CardText::plain("GitHub PR Bot Test"),
        },
        elements: vec![
            CardElement::Div {
                text: CardText::markdown(body),
            },
            CardElement::Action {
                actions: vec![CardButton::primary_link("Health check", health_url)],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(action: &str, merged: bool) -> PullRequestEvent {
        PullRequestEvent {
            action: PrAction::from(action),
            repository: "a/b".to_string(),
            number: 7,
            title: "Add widgets".to_string(),
            html_url: "https://github.com/a/b/pull/7".to_string(),
            author: "alice".to_string(),
            merged,
            requested_reviewers: vec!["bob".to_string(), "carol".to_string()],
            sender: "dave".to_string(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(CardType::classify(&PrAction::Opened, false), CardType::Open);
        assert_eq!(CardType::classify(&PrAction::Reopened, false), CardType::Open);
        assert_eq!(CardType::classify(&PrAction::Synchronize, false), CardType::Open);
        assert_eq!(CardType::classify(&PrAction::Closed, true), CardType::Merged);
        assert_eq!(CardType::classify(&PrAction::Closed, false), CardType::Closed);
        assert_eq!(CardType::default(), CardType::Open);
    }

    #[test]
    fn test_open_card() {
        let event = sample_event("opened", false);
        let card = build_pr_card(&event, event.card_type(), " x/y | 12 +10-2 (1 files)");

        assert_eq!(card.header.template, "blue");
        assert_eq!(card.header_title(), "a/b: New Pull Request");
        let body = card.body().unwrap();
        assert!(body.starts_with("**Add widgets**"));
        assert!(body.contains("+10-2"));
        assert!(body.contains("**Author**: alice"));
        assert!(body.contains("**Reviewer**: bob, carol"));
        assert!(!body.contains("Merged by"));
    }

    #[test]
    fn test_merged_card_names_merger() {
        let event = sample_event("closed", true);
        let card = build_pr_card(&event, event.card_type(), "No files changed");

        assert_eq!(card.header.template, "green");
        assert_eq!(card.header_title(), "a/b: PR Merged");
        assert!(card.body().unwrap().ends_with("**Merged by**: dave"));
    }

    #[test]
    fn test_closed_card_without_reviewers() {
        let mut event = sample_event("closed", false);
        event.requested_reviewers.clear();
        let card = build_pr_card(&event, event.card_type(), "");

        assert_eq!(card.header.template, "grey");
        assert_eq!(card.header_title(), "a/b: PR Closed");
        assert!(card.body().unwrap().contains("**Reviewer**: none assigned"));
    }

    #[test]
    fn test_card_wire_shape() {
        let event = sample_event("opened", false);
        let card = build_pr_card(&event, CardType::Open, "stats");
        let value: serde_json::Value = serde_json::from_str(&card.to_content().unwrap()).unwrap();

        assert_eq!(value["header"]["title"]["tag"], "plain_text");
        assert_eq!(value["elements"][0]["tag"], "div");
        assert_eq!(value["elements"][0]["text"]["tag"], "lark_md");
        assert_eq!(value["elements"][1]["tag"], "action");
        assert_eq!(value["elements"][1]["actions"][0]["tag"], "button");
        assert_eq!(value["elements"][1]["actions"][0]["type"], "primary");
        assert_eq!(
            value["elements"][1]["actions"][0]["url"],
            "https://github.com/a/b/pull/7"
        );
    }

    #[test]
    fn test_test_card() {
        let card = build_test_card("2026-01-01 00:00:00", 8080, "http://0.0.0.0:8080/health");
        assert_eq!(card.header.template, "green");
        assert!(card.body().unwrap().contains("**Port**: 8080"));
    }
}
