//! HTTP server
//!
//! Routes:
//! - `POST /webhook` - GitHub deliveries
//! - `POST /`        - same as `/webhook` when `X-GitHub-Event` is present
//! - `GET  /`        - service info
//! - `GET  /health`  - liveness probe
//! - `POST /test`    - post the connectivity test card

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prcard_core::{build_test_card, RelayError};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::handler::{EventRelay, RelayOutcome};
use crate::platforms::github::EVENT_HEADER;

/// Server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    pub bind_addr: SocketAddr,

    /// Maximum accepted request body
    pub max_body_size: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    relay: Arc<EventRelay>,
    bind_addr: SocketAddr,
}

impl AppState {
    pub fn new(relay: Arc<EventRelay>, bind_addr: SocketAddr) -> Self {
        Self { relay, bind_addr }
    }

    /// Health URL advertised on the test card
    fn health_url(&self) -> String {
        let host = if self.bind_addr.ip().is_unspecified() {
            "localhost".to_string()
        } else {
            self.bind_addr.ip().to_string()
        };
        format!("http://{}:{}/health", host, self.bind_addr.port())
    }
}

/// Build the router with every route and layer attached
pub fn router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(root_handler).post(root_post_handler))
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/test", post(test_card_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Webhook relay server
pub struct RelayServer {
    relay: Arc<EventRelay>,
    config: RelayServerConfig,
}

impl RelayServer {
    pub fn new(relay: Arc<EventRelay>) -> Self {
        Self::with_config(relay, RelayServerConfig::default())
    }

    pub fn with_config(relay: Arc<EventRelay>, config: RelayServerConfig) -> Self {
        Self { relay, config }
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = AppState::new(self.relay, self.config.bind_addr);
        let app = router(state, self.config.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("Relay server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

fn service_info() -> serde_json::Value {
    json!({
        "service": "prcard",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "GitHub pull request cards for Feishu/Lark group chats",
        "endpoints": {
            "webhook": "POST /webhook",
            "health": "GET /health",
            "test": "POST /test"
        }
    })
}

async fn root_handler() -> impl IntoResponse {
    Json(service_info())
}

/// GitHub apps are often pointed at the bare host
async fn root_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if headers.contains_key(EVENT_HEADER) {
        return relay_delivery(&state, &headers, &body).await;
    }

    info!("POST / without {} header ({} bytes)", EVENT_HEADER, body.len());
    Json(service_info()).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "prcard"
    }))
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay_delivery(&state, &headers, &body).await
}

async fn test_card_handler(State(state): State<AppState>) -> Response {
    let sent_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let card = build_test_card(&sent_at, state.bind_addr.port(), &state.health_url());

    match state.relay.send_card(&card).await {
        Ok(message_id) => Json(json!({
            "status": "success",
            "message_id": message_id
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn relay_delivery(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let headers = header_map(headers);

    match state.relay.handle(body, &headers).await {
        Ok(RelayOutcome::Ignored { reason }) => Json(json!({
            "status": "ignored",
            "reason": reason
        }))
        .into_response(),
        Ok(outcome) => {
            let mut body = serde_json::to_value(&outcome).unwrap_or_default();
            body["status"] = json!("success");
            Json(body).into_response()
        }
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !err.is_client_error() {
        error!("Request failed: {}", err);
    }

    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Lowercased header names; values that are not valid UTF-8 are dropped
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut header_map = HashMap::new();
    for (key, value) in headers.iter() {
        if let Ok(value_str) = value.to_str() {
            header_map.insert(key.as_str().to_ascii_lowercase(), value_str.to_string());
        }
    }
    header_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_header_map_lowercases() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-GitHub-Event").unwrap(),
            HeaderValue::from_static("pull_request"),
        );
        headers.insert("x-github-delivery", HeaderValue::from_static("d-1"));

        let map = header_map(&headers);
        assert_eq!(map.get("x-github-event").map(String::as_str), Some("pull_request"));
        assert_eq!(map.get("x-github-delivery").map(String::as_str), Some("d-1"));
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(&RelayError::unauthorized("Invalid signature"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = error_response(&RelayError::upstream_send("code 1"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_default_config() {
        let config = RelayServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
    }
}
