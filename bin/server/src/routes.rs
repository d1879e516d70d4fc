//! HTTP routes.
//!
//! Webhook and action endpoints always answer `200` with an echo of what was
//! received; outcomes are only visible in the logs.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use flowhook_core::{OrganizationId, WebhookId};
use flowhook_pipeline::{ActionEvent, DeliveryHeaders, GITLAB, HandlerPipeline, WebhookDelivery};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared application state.
pub struct AppState {
    /// The event pipeline.
    pub pipeline: Arc<HandlerPipeline>,
}

impl AppState {
    /// Creates new application state.
    pub fn new(pipeline: Arc<HandlerPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Builds the router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/hooks/gitlab/{organization_id}/{webhook_id}",
            post(gitlab_hook),
        )
        .route("/actions/gitlab-v4", post(gitlab_action))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn delivery_headers(headers: &HeaderMap) -> DeliveryHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

/// Receives a GitLab webhook.
pub async fn gitlab_hook(
    State(state): State<Arc<AppState>>,
    Path((organization_id, webhook_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<JsonValue> {
    let delivery = WebhookDelivery {
        organization_id: OrganizationId::new(organization_id),
        webhook_id: WebhookId::new(webhook_id),
        headers: delivery_headers(&headers),
        body: body.to_vec(),
    };

    state.pipeline.handle_webhook(&delivery).await;

    Json(json!({
        "organizationId": delivery.organization_id,
        "webhookId": delivery.webhook_id,
        "event": delivery.headers.get(GITLAB.event_header),
        "userAgent": delivery.headers.get("User-Agent"),
        "body": String::from_utf8_lossy(&delivery.body),
    }))
}

/// Receives an action event.
pub async fn gitlab_action(State(state): State<Arc<AppState>>, body: Bytes) -> Json<JsonValue> {
    let Ok(received) = serde_json::from_slice::<JsonValue>(&body) else {
        warn!("action event body is not JSON");
        return Json(JsonValue::String(String::from_utf8_lossy(&body).into_owned()));
    };

    match serde_json::from_value::<ActionEvent>(received.clone()) {
        Ok(event) => {
            state.pipeline.handle_action_event(&event).await;
        }
        Err(e) => warn!(error = %e, "action event has an unexpected shape"),
    }

    Json(received)
}

/// Liveness check.
pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}
