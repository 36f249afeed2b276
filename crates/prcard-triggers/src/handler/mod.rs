//! Event relay
//!
//! Turns one GitHub webhook delivery into at most one chat API call:
//!
//! 1. verify the signature over the raw body
//! 2. parse the payload
//! 3. drop anything that is not a notifiable `pull_request` action
//! 4. classify the card (open / merged / closed)
//! 5. resolve repository and PR number
//! 6. obtain an access token
//! 7. render the card, with diff statistics or a placeholder
//! 8. update the PR's existing card, or create one and record its id
//!
//! Step 8's lookup-create-record sequence is serialized per PR so two
//! concurrent deliveries for the same PR cannot both post a new card.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use prcard_core::{
    build_pr_card, summarize, Card, CardType, PullRequestEvent, RelayError, RelayResult,
};
use prcard_store::MessageIndex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::credential::CredentialCache;
use crate::platforms::github::{
    parse_json_body, GitHubPlatform, PullRequestWebhook, DELIVERY_HEADER, EVENT_HEADER,
    PULL_REQUEST_EVENT, SIGNATURE_HEADER,
};
use crate::platforms::{CardSink, DiffSource, PlatformError};

/// Prefix of the text shown in place of diff statistics when they cannot be fetched
pub const DIFF_FETCH_FAILED: &str = "Failed to fetch PR file stats";

/// App credentials exchanged for access tokens
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: String,
}

/// What the relay did with a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Not a notifiable event; nothing was sent
    Ignored { reason: String },
    /// A new card was posted
    Created {
        message_id: String,
        card_type: CardType,
    },
    /// The PR's existing card was updated in place
    Updated {
        message_id: String,
        card_type: CardType,
    },
}

impl RelayOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Created { message_id, .. } | Self::Updated { message_id, .. } => Some(message_id),
            Self::Ignored { .. } => None,
        }
    }
}

/// Webhook-to-card orchestrator
///
/// Every collaborator is injected, so the stores are shared process-wide and
/// the outbound calls can be replaced in tests.
pub struct EventRelay {
    github: Arc<GitHubPlatform>,
    diff_source: Arc<dyn DiffSource>,
    sink: Arc<dyn CardSink>,
    credentials: Arc<CredentialCache>,
    index: MessageIndex,
    app: AppCredentials,
    pr_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EventRelay {
    /// Create a relay that reads diff statistics through `github`
    pub fn new(
        github: Arc<GitHubPlatform>,
        sink: Arc<dyn CardSink>,
        credentials: Arc<CredentialCache>,
        index: MessageIndex,
        app: AppCredentials,
    ) -> Self {
        let diff_source: Arc<dyn DiffSource> = github.clone();
        Self {
            github,
            diff_source,
            sink,
            credentials,
            index,
            app,
            pr_locks: DashMap::new(),
        }
    }

    /// Read changed files from another source
    pub fn with_diff_source(mut self, diff_source: Arc<dyn DiffSource>) -> Self {
        self.diff_source = diff_source;
        self
    }

    pub fn index(&self) -> &MessageIndex {
        &self.index
    }

    /// Handle one delivery. `headers` must use lowercase names.
    pub async fn handle(
        &self,
        raw: &[u8],
        headers: &HashMap<String, String>,
    ) -> RelayResult<RelayOutcome> {
        let delivery = headers
            .get(DELIVERY_HEADER)
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let event_type = headers.get(EVENT_HEADER).map(String::as_str).unwrap_or("");

        let span = info_span!("delivery", id = %delivery, event = %event_type);
        self.process(raw, headers, event_type).instrument(span).await
    }

    async fn process(
        &self,
        raw: &[u8],
        headers: &HashMap<String, String>,
        event_type: &str,
    ) -> RelayResult<RelayOutcome> {
        let signature = headers.get(SIGNATURE_HEADER).map(String::as_str);
        if !self.github.verify_signature(raw, signature) {
            warn!("Rejected delivery with invalid signature");
            return Err(RelayError::unauthorized("Invalid signature"));
        }

        let payload = parse_json_body(raw).map_err(|e| RelayError::bad_request(e.to_string()))?;

        info!("Received GitHub event: {}", event_type);
        if event_type != PULL_REQUEST_EVENT {
            return Ok(RelayOutcome::ignored(format!(
                "event '{}' is not handled",
                event_type
            )));
        }

        let webhook = PullRequestWebhook::from_value(payload)
            .map_err(|e| RelayError::bad_request(e.to_string()))?;

        let action = webhook.action();
        if !action.is_notifiable() {
            debug!("Ignoring pull_request action {}", action);
            return Ok(RelayOutcome::ignored(format!(
                "action '{}' is not handled",
                action
            )));
        }

        let card_type = CardType::classify(&action, webhook.is_merged());

        let event = webhook
            .into_event()
            .map_err(|e| RelayError::bad_request(e.to_string()))?;
        info!("{} {} -> {} card", event.display_key(), action, card_type);

        let token = self
            .credentials
            .get_token(&self.app.app_id, &self.app.app_secret)
            .await?;

        let diff_stats = self.diff_stats(&event).await;
        let card = build_pr_card(&event, card_type, &diff_stats);

        self.dispatch(&event, card_type, &token, &card).await
    }

    /// Rendered diff statistics, or a placeholder when the fetch fails
    async fn diff_stats(&self, event: &PullRequestEvent) -> String {
        match self.fetch_diff_stats(event).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("{}", e);
                format!("{}: {}", DIFF_FETCH_FAILED, e.detail())
            }
        }
    }

    async fn fetch_diff_stats(&self, event: &PullRequestEvent) -> RelayResult<String> {
        let files = self
            .diff_source
            .changed_files(&event.repository, event.number)
            .await
            .map_err(|e| RelayError::upstream_fetch(e.to_string()))?;
        Ok(summarize(&files))
    }

    async fn dispatch(
        &self,
        event: &PullRequestEvent,
        card_type: CardType,
        token: &str,
        card: &Card,
    ) -> RelayResult<RelayOutcome> {
        let key = MessageIndex::key(&event.repository, event.number);
        let lock = self
            .pr_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = lock.lock().await;
            self.create_or_update(event, card_type, token, card).await
        };

        // Nobody else holds or waits on this lock once only the map and we do
        self.pr_locks
            .remove_if(&key, |_, l| Arc::strong_count(l) <= 2);

        outcome
    }

    async fn create_or_update(
        &self,
        event: &PullRequestEvent,
        card_type: CardType,
        token: &str,
        card: &Card,
    ) -> RelayResult<RelayOutcome> {
        if let Some(message_id) = self.index.lookup(&event.repository, event.number).await {
            if let Err(e) = self.sink.update_card(token, &message_id, card).await {
                return Err(self.send_failed(e).await);
            }

            info!("Updated card {} for {}", message_id, event.display_key());
            return Ok(RelayOutcome::Updated {
                message_id,
                card_type,
            });
        }

        let message_id = match self.sink.create_card(token, card).await {
            Ok(id) => id,
            Err(e) => return Err(self.send_failed(e).await),
        };

        if let Err(e) = self
            .index
            .record(&event.repository, event.number, &message_id)
            .await
        {
            error!("Failed to persist message mapping: {}", RelayError::from(e));
        }

        info!("Created card {} for {}", message_id, event.display_key());
        Ok(RelayOutcome::Created {
            message_id,
            card_type,
        })
    }

    /// Post a standalone card (the connectivity test card). The index is not touched.
    pub async fn send_card(&self, card: &Card) -> RelayResult<String> {
        let token = self
            .credentials
            .get_token(&self.app.app_id, &self.app.app_secret)
            .await?;

        let message_id = match self.sink.create_card(&token, card).await {
            Ok(id) => id,
            Err(e) => return Err(self.send_failed(e).await),
        };

        info!("Sent standalone card {}", message_id);
        Ok(message_id)
    }

    /// Map a card delivery failure, dropping the cached token if it was refused
    async fn send_failed(&self, err: PlatformError) -> RelayError {
        if err.is_token_rejected() {
            warn!("Access token refused by the chat platform, discarding it");
            self.credentials.invalidate().await;
        }
        RelayError::upstream_send(err.to_string())
    }
}
