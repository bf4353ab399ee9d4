//! Operator routes that act with the `system` role.
//!
//! These move escrowed funds (`resolve_for_owner`, `confirm_refund`, ...)
//! and carry no caller authentication. [`crate::api::build_app`] only
//! mounts them under `/internal/v1` when internal routes are enabled,
//! which must be behind a private network or admin gateway.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{DealDto, SystemActionRequest};
use crate::app_state::AppState;
use crate::domain::{Actor, DealId};
use crate::error::{ErrorResponse, ServiceError};

/// `POST /internal/v1/deals/{id}/system-actions` — Apply a system action.
///
/// # Errors
///
/// Returns [`ServiceError`] if the table has no `system` entry for the
/// action in the deal's current status.
#[utoipa::path(
    post,
    path = "/internal/v1/deals/{id}/system-actions",
    tag = "Internal",
    summary = "Apply a system action",
    description = "Applies a `system` row of the transition table, such as `retry_post`, `request_refund`, `confirm_refund` or dispute resolution. Not mounted unless internal routes are enabled.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    request_body = SystemActionRequest,
    responses(
        (status = 200, description = "Updated deal", body = DealDto),
        (status = 404, description = "Deal not found", body = ErrorResponse),
        (status = 409, description = "Not allowed in the current status", body = ErrorResponse),
        (status = 422, description = "Escrow cannot cover the movement", body = ErrorResponse),
    )
)]
pub async fn apply_system_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SystemActionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal_id = DealId::from_uuid(id);
    tracing::info!(%deal_id, action = %req.action.kind(), "system action requested");
    let deal = state
        .deal_service
        .apply_action(deal_id, Actor::System, req.action)
        .await?;
    Ok(Json(DealDto::from(deal)))
}

/// Internal routes, nested under `/internal/v1` when enabled.
pub fn routes() -> Router<AppState> {
    Router::new().route("/deals/{id}/system-actions", post(apply_system_action))
}
