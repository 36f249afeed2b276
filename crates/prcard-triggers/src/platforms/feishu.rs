//! Feishu/Lark adapter
//!
//! Three calls against the Open Platform API:
//! - `tenant_access_token/internal` to exchange app credentials for a token
//! - `im/v1/messages` (POST) to post an interactive card into the chat
//! - `im/v1/messages/{id}` (PATCH) to replace the content of a posted card
//!
//! Every response carries an application `code`; anything but `0` is a
//! failure even when the HTTP status is 200.

use async_trait::async_trait;
use prcard_core::Card;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{CardSink, IssuedToken, PlatformError, TokenSource};

/// Token lifetime assumed when the provider omits `expire`
const DEFAULT_TOKEN_TTL_SECS: i64 = 7200;

/// API codes meaning the tenant access token itself was refused
/// (invalid and expired, respectively)
pub const TOKEN_REJECTED_CODES: [i64; 2] = [99991663, 99991668];

/// Feishu configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    pub app_id: String,

    pub app_secret: String,

    /// Group chat that receives the cards
    pub chat_id: String,

    /// API base URL (`https://open.larksuite.com` for Lark)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://open.feishu.cn".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Tenant token response. Token fields sit next to `code`, not under `data`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default = "unknown_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<i64>,
}

/// Envelope shared by the message APIs
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "unknown_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(default)]
    message_id: Option<String>,
}

/// A response without `code` is never a success
fn unknown_code() -> i64 {
    -1
}

/// Feishu platform adapter
pub struct FeishuPlatform {
    config: FeishuConfig,
    client: reqwest::Client,
}

impl FeishuPlatform {
    pub fn new(config: FeishuConfig) -> Result<Self, PlatformError> {
        if config.app_id.is_empty() || config.app_secret.is_empty() || config.chat_id.is_empty() {
            return Err(PlatformError::Config(
                "Feishu app_id, app_secret and chat_id are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlatformError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Exchange app credentials for a tenant access token
    pub async fn fetch_tenant_token(
        &self,
        app_id: &str,
        app_secret: &str,
    ) -> Result<IssuedToken, PlatformError> {
        let response = self
            .client
            .post(self.endpoint("/open-apis/auth/v3/tenant_access_token/internal"))
            .json(&serde_json::json!({
                "app_id": app_id,
                "app_secret": app_secret,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Feishu token endpoint returned {}", status);
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(format!("Failed to parse token response: {}", e)))?;

        if token_response.code != 0 {
            error!("Feishu token API error: {} {}", token_response.code, token_response.msg);
            return Err(PlatformError::ApiError {
                code: token_response.code,
                msg: token_response.msg,
            });
        }

        let token = token_response
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PlatformError::ParseError("No tenant_access_token in response".to_string()))?;

        info!("Obtained new tenant access token");
        Ok(IssuedToken {
            token,
            expires_in: token_response.expire.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        })
    }

    /// Post a card into the configured chat and return its message id
    pub async fn send_card(&self, token: &str, card: &Card) -> Result<String, PlatformError> {
        let content = encode_card(card)?;

        let response = self
            .client
            .post(self.endpoint("/open-apis/im/v1/messages"))
            .query(&[("receive_id_type", "chat_id")])
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "receive_id": self.config.chat_id,
                "msg_type": "interactive",
                "content": content,
            }))
            .send()
            .await?;

        let data: Option<MessageData> = decode_api_response(response).await?;
        let message_id = data
            .and_then(|d| d.message_id)
            .ok_or_else(|| PlatformError::ParseError("No message_id in response".to_string()))?;

        debug!("Posted card {} to chat {}", message_id, self.config.chat_id);
        Ok(message_id)
    }

    /// Replace the content of a previously posted card
    pub async fn patch_card(
        &self,
        token: &str,
        message_id: &str,
        card: &Card,
    ) -> Result<(), PlatformError> {
        let content = encode_card(card)?;

        let response = self
            .client
            .patch(self.endpoint(&format!("/open-apis/im/v1/messages/{}", message_id)))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;

        let _: Option<serde_json::Value> = decode_api_response(response).await?;

        debug!("Updated card {}", message_id);
        Ok(())
    }
}

fn encode_card(card: &Card) -> Result<String, PlatformError> {
    card.to_content()
        .map_err(|e| PlatformError::ParseError(format!("Failed to encode card: {}", e)))
}

/// Decode the `{code, msg, data}` envelope.
///
/// The application code wins over the HTTP status when the body decodes,
/// since Feishu reports most failures as a 400 with a meaningful code.
async fn decode_api_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, PlatformError> {
    let status = response.status();
    let body = response.text().await?;

    let envelope = match serde_json::from_str::<ApiResponse<T>>(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(PlatformError::ParseError(format!("Failed to parse response: {}", e)));
        }
        Err(_) => {
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }
    };

    if envelope.code != 0 {
        error!("Feishu API error: {} {}", envelope.code, envelope.msg);
        return Err(PlatformError::ApiError {
            code: envelope.code,
            msg: envelope.msg,
        });
    }

    if !status.is_success() {
        return Err(PlatformError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(envelope.data)
}

#[async_trait]
impl TokenSource for FeishuPlatform {
    async fn request_token(
        &self,
        app_id: &str,
        app_secret: &str,
    ) -> Result<IssuedToken, PlatformError> {
        self.fetch_tenant_token(app_id, app_secret).await
    }
}

#[async_trait]
impl CardSink for FeishuPlatform {
    async fn create_card(&self, token: &str, card: &Card) -> Result<String, PlatformError> {
        self.send_card(token, card).await
    }

    async fn update_card(
        &self,
        token: &str,
        message_id: &str,
        card: &Card,
    ) -> Result<(), PlatformError> {
        self.patch_card(token, message_id, card).await
    }
}
