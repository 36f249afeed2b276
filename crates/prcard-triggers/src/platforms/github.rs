//! GitHub adapter
//!
//! Covers both directions of the GitHub integration:
//! - inbound: HMAC-SHA256 webhook signature verification and the strict
//!   parse of `pull_request` payloads into a [`PullRequestEvent`]
//! - outbound: the pull-request files API used for diff statistics
//!
//! # Example Usage
//!
//! ```yaml
//! spec:
//!   github:
//!     webhook_secret_env: GITHUB_WEBHOOK_SECRET
//!     token_env: GITHUB_TOKEN
//!     api_url: https://api.github.com
//! ```

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use prcard_core::{ChangedFile, PrAction, PullRequestEvent};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{DiffSource, PlatformError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` over the raw body
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header naming the event type (`pull_request`, `push`, ...)
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the unique delivery id
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// The only event type the relay acts on
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// GitHub caps the files endpoint at 3000 entries
const FILES_PER_PAGE: usize = 100;
const MAX_FILE_PAGES: usize = 30;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Webhook secret for signature verification. Verification is skipped
    /// when unset.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Token for the REST API. Public repositories work without one.
    #[serde(default)]
    pub token: Option<String>,

    /// API base URL (for GitHub Enterprise support)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for API calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            token: None,
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============================================================================
// WEBHOOK PAYLOAD TYPES
// ============================================================================

/// GitHub user reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubUser {
    #[serde(default)]
    pub login: String,
}

/// Repository block of a webhook payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubRepository {
    #[serde(default)]
    pub full_name: Option<String>,
}

/// `pull_request` block of a webhook payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubPullRequest {
    #[serde(default)]
    pub number: Option<u64>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub html_url: Option<String>,

    /// `null` on some deliveries for open PRs
    #[serde(default)]
    pub merged: Option<bool>,

    #[serde(default)]
    pub user: Option<GitHubUser>,

    #[serde(default)]
    pub requested_reviewers: Option<Vec<GitHubUser>>,
}

/// Raw `pull_request` webhook payload
///
/// Every field is optional on the wire; [`PullRequestWebhook::into_event`]
/// decides which ones are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestWebhook {
    #[serde(default)]
    pub action: Option<String>,

    /// Top-level copy of the PR number
    #[serde(default)]
    pub number: Option<u64>,

    #[serde(default)]
    pub pull_request: Option<GitHubPullRequest>,

    #[serde(default)]
    pub repository: Option<GitHubRepository>,

    #[serde(default)]
    pub sender: Option<GitHubUser>,
}

impl PullRequestWebhook {
    pub fn from_value(value: serde_json::Value) -> Result<Self, PlatformError> {
        serde_json::from_value(value)
            .map_err(|e| PlatformError::ParseError(format!("Malformed pull_request payload: {}", e)))
    }

    pub fn action(&self) -> PrAction {
        PrAction::from(self.action.as_deref().unwrap_or_default())
    }

    pub fn is_merged(&self) -> bool {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.merged)
            .unwrap_or(false)
    }

    /// Resolve into a typed event. Repository name and PR number are required.
    pub fn into_event(self) -> Result<PullRequestEvent, PlatformError> {
        let action = self.action();
        let merged = self.is_merged();

        let repository = self
            .repository
            .and_then(|r| r.full_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PlatformError::ParseError("Missing repository.full_name".to_string()))?;

        let pr = self.pull_request.unwrap_or_default();
        let number = pr
            .number
            .or(self.number)
            .ok_or_else(|| PlatformError::ParseError("Missing pull_request.number".to_string()))?;

        let requested_reviewers = pr
            .requested_reviewers
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.login)
            .filter(|login| !login.is_empty())
            .collect();

        Ok(PullRequestEvent {
            action,
            repository,
            number,
            title: pr.title.unwrap_or_default(),
            html_url: pr.html_url.unwrap_or_default(),
            author: pr.user.map(|u| u.login).unwrap_or_default(),
            merged,
            requested_reviewers,
            sender: self.sender.map(|u| u.login).unwrap_or_default(),
        })
    }
}

/// Decode a webhook body of any event type.
///
/// An empty body and `{}` are rejected as empty payloads. Any other
/// non-object document is rejected as well.
pub fn parse_json_body(payload: &[u8]) -> Result<serde_json::Value, PlatformError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(PlatformError::ParseError("Empty payload".to_string()));
    }

    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| PlatformError::ParseError(format!("Invalid JSON: {}", e)))?;

    match value.as_object() {
        Some(map) if map.is_empty() => {
            Err(PlatformError::ParseError("Empty payload".to_string()))
        }
        Some(_) => Ok(value),
        None => Err(PlatformError::ParseError("Payload must be a JSON object".to_string())),
    }
}

/// Compute the `X-Hub-Signature-256` value GitHub would send for `payload`
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, PlatformError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PlatformError::InvalidSignature(format!("HMAC setup failed: {}", e)))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ============================================================================
// PLATFORM
// ============================================================================

/// GitHub platform adapter
pub struct GitHubPlatform {
    config: GitHubConfig,
    client: reqwest::Client,
}

impl GitHubPlatform {
    pub fn new(config: GitHubConfig) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("prcard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Config(format!("Failed to create HTTP client: {}", e)))?;

        if config.webhook_secret.as_deref().map_or(true, str::is_empty) {
            warn!("No GitHub webhook secret configured, signatures will not be verified");
        }

        Ok(Self { config, client })
    }

    /// Verify the HMAC-SHA256 signature of a webhook delivery
    ///
    /// Always passes when no secret is configured. Otherwise the header must
    /// be present, start with `sha256=` and match in constant time.
    pub fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let secret = match self.config.webhook_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret,
            _ => return true,
        };

        let Some(signature) = signature else {
            debug!("Missing signature header");
            return false;
        };

        let Some(provided) = signature.strip_prefix("sha256=") else {
            debug!("Invalid signature format - must start with sha256=");
            return false;
        };

        let provided = match hex::decode(provided) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("Signature is not valid hex");
                return false;
            }
        };

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                error!("HMAC setup failed: {}", e);
                return false;
            }
        };

        mac.update(payload);
        match mac.verify_slice(&provided) {
            Ok(()) => {
                debug!("GitHub signature verified successfully");
                true
            }
            Err(_) => {
                debug!("Signature mismatch");
                false
            }
        }
    }

    /// List every file changed by a pull request, following pagination
    pub async fn list_pull_request_files(
        &self,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<ChangedFile>, PlatformError> {
        let url = format!(
            "{}/repos/{}/pulls/{}/files",
            self.config.api_url.trim_end_matches('/'),
            repo,
            pr_number
        );

        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let batch: Vec<ChangedFile> = self.get_json(&url, page).await?;
            let last_page = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if last_page {
                break;
            }
        }

        info!("Fetched {} changed files for {}#{}", files.len(), repo, pr_number);
        Ok(files)
    }

    /// GET one page, falling back from `Bearer` to the classic `token`
    /// scheme when the former is rejected
    async fn get_json<T: DeserializeOwned>(&self, url: &str, page: usize) -> Result<T, PlatformError> {
        let token = self.config.token.as_deref().filter(|t| !t.is_empty());

        let mut response = self
            .send_get(url, page, token.map(|t| format!("Bearer {}", t)))
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(token) = token {
                debug!("Bearer auth rejected, retrying with token scheme");
                response = self
                    .send_get(url, page, Some(format!("token {}", token)))
                    .await?;
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GitHub API returned {} for {}", status, url);
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(format!("Failed to decode files response: {}", e)))
    }

    async fn send_get(
        &self,
        url: &str,
        page: usize,
        authorization: Option<String>,
    ) -> Result<reqwest::Response, PlatformError> {
        let mut request = self
            .client
            .get(url)
            .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl DiffSource for GitHubPlatform {
    async fn changed_files(
        &self,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<ChangedFile>, PlatformError> {
        self.list_pull_request_files(repo, pr_number).await
    }
}
