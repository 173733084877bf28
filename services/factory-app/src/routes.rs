//! HTTP routes
//!
//! `POST /webhook` verifies the raw body before anything parses it, then
//! routes `issues` events to the tracking updater.

use crate::config::ServerLimits;
use crate::stages::IssuesEvent;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use factory_github_app::webhook::SIGNATURE_HEADER;
use serde_json::json;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const EVENT_HEADER: &str = "X-GitHub-Event";

pub fn build_router(state: AppState, limits: ServerLimits) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(GlobalConcurrencyLimitLayer::new(limits.max_in_flight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "app": "Factory GitHub App",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if state.authenticator.authenticate(&body, signature).is_err() {
        error!("Invalid webhook signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid signature"})),
        )
            .into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Failed to parse webhook payload: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "Invalid JSON payload"})),
            )
                .into_response();
        }
    };

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    let action = payload
        .get("action")
        .and_then(|value| value.as_str())
        .unwrap_or("unknown")
        .to_string();

    info!(event, action = %action, "Received event: {}.{}", event, action);

    match event {
        "ping" => {
            info!("Received ping event");
            return Json(json!({"message": "pong"})).into_response();
        }
        "issues" => match serde_json::from_value::<IssuesEvent>(payload) {
            Ok(issues_event) => {
                if let Some(update) = issues_event.stage_update() {
                    // Errors are logged, not returned, so GitHub does not redeliver
                    if let Err(err) = state.tracker.update(&update).await {
                        error!("Failed to update Factory tracking: {err:#}");
                    }
                }
            }
            Err(err) => error!("Error handling webhook: {err}"),
        },
        other => info!("Ignoring event: {}.{}", other, action),
    }

    Json(json!({"status": "accepted"})).into_response()
}
