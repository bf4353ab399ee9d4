//! System endpoints: health check and the transition table.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::TransitionRule;
use crate::domain::transition::TRANSITION_TABLE;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    ws_subscribers: usize,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the number of live event subscribers.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ws_subscribers: state.event_bus.receiver_count(),
        }),
    )
}

/// `GET /config/transitions` — The deal state graph.
#[utoipa::path(
    get,
    path = "/config/transitions",
    tag = "System",
    summary = "List legal transitions",
    description = "Returns every (status, role, action) triple the engine accepts, with the resulting status and ledger effect.",
    responses(
        (status = 200, description = "Transition table", body = Vec<TransitionRule>),
    )
)]
pub async fn transitions_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(TRANSITION_TABLE))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/transitions", get(transitions_handler))
}
