//! Deal handlers: create, list, get, approval, actions, post results and
//! escrow inspection.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{
    ActionRequest, ApprovalRequest, CreateDealRequest, DealDto, DealListQuery, DealListResponse,
    EscrowResponse, PostResultRequest, paginate,
};
use crate::app_state::AppState;
use crate::domain::{DealId, UserId};
use crate::error::{ErrorResponse, ServiceError};

/// `POST /deals` — Create a deal.
///
/// # Errors
///
/// Returns [`ServiceError`] on missing fields or an invalid price.
#[utoipa::path(
    post,
    path = "/api/v1/deals",
    tag = "Deals",
    summary = "Create a deal",
    description = "Creates a deal between an advertiser and a channel owner. The deal starts in `submitted` (or `draft` with `as_draft`) and the channel owner is notified.",
    request_body = CreateDealRequest,
    responses(
        (status = 201, description = "Deal created", body = DealDto),
        (status = 400, description = "Missing or invalid field", body = ErrorResponse),
    )
)]
pub async fn create_deal(
    State(state): State<AppState>,
    Json(req): Json<CreateDealRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal = state.deal_service.create_deal(req.into_new_deal()?).await?;
    Ok((StatusCode::CREATED, Json(DealDto::from(deal))))
}

/// `GET /deals` — List deals with filters and pagination.
///
/// # Errors
///
/// Returns [`ServiceError`] on an unknown status filter or storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/deals",
    tag = "Deals",
    summary = "List deals",
    description = "Returns deals newest first, optionally filtered by advertiser, channel and status.",
    params(DealListQuery),
    responses(
        (status = 200, description = "Paginated deal list", body = DealListResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
    )
)]
pub async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<DealListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let deals = state.deal_service.list_deals(&query.filter()?).await?;
    let (page, pagination) = paginate(deals, query.page, query.per_page);
    Ok(Json(DealListResponse {
        data: page.into_iter().map(DealDto::from).collect(),
        pagination,
    }))
}

/// `GET /deals/{id}` — Get a deal.
///
/// # Errors
///
/// Returns [`ServiceError::DealNotFound`] if the deal does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/deals/{id}",
    tag = "Deals",
    summary = "Get deal details",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    responses(
        (status = 200, description = "Deal details", body = DealDto),
        (status = 404, description = "Deal not found", body = ErrorResponse),
    )
)]
pub async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal = state.deal_service.get_deal(DealId::from_uuid(id)).await?;
    Ok(Json(DealDto::from(deal)))
}

/// `POST /deals/{id}/approval` — Approve or reject as one participant.
///
/// # Errors
///
/// Returns [`ServiceError`] if the caller is not the named participant,
/// the deal is not awaiting them, or escrow fails.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/approval",
    tag = "Deals",
    summary = "Approve or reject a deal",
    description = "The channel owner accepting a submitted deal escrows the price from the advertiser. The advertiser accepting the creative requests publication. Rejections cancel the deal and refund any held funds.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    request_body = ApprovalRequest,
    responses(
        (status = 200, description = "Updated deal", body = DealDto),
        (status = 422, description = "Advertiser cannot cover the price", body = ErrorResponse),
        (status = 403, description = "Caller is not that participant", body = ErrorResponse),
        (status = 404, description = "Deal not found", body = ErrorResponse),
        (status = 409, description = "Not allowed in the current status", body = ErrorResponse),
    )
)]
pub async fn approve_deal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovalRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal = state
        .deal_service
        .approve_or_reject(
            DealId::from_uuid(id),
            UserId(req.approver_id),
            req.is_advertiser,
            req.reject,
            req.reason,
        )
        .await?;
    Ok(Json(DealDto::from(deal)))
}

/// `POST /deals/{id}/actions` — Apply any lifecycle action.
///
/// # Errors
///
/// Returns [`ServiceError`] if the action is not allowed for the caller
/// in the deal's current status.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/actions",
    tag = "Deals",
    summary = "Apply a deal action",
    description = "Applies one action of the transition table, such as `submit_draft`, `propose_post_time` or `open_dispute`. See `GET /config/transitions` for the full table.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Updated deal", body = DealDto),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 403, description = "Caller is not that participant, or claimed the system role", body = ErrorResponse),
        (status = 404, description = "Deal not found", body = ErrorResponse),
        (status = 409, description = "Not allowed in the current status", body = ErrorResponse),
    )
)]
pub async fn apply_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = req.actor()?;
    let deal = state
        .deal_service
        .apply_action(DealId::from_uuid(id), actor, req.action)
        .await?;
    Ok(Json(DealDto::from(deal)))
}

/// `POST /deals/{id}/post-result` — Report a publication outcome.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidTransition`] unless the deal awaits
/// publication.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/post-result",
    tag = "Deals",
    summary = "Record a publication result",
    description = "Moves an approved or scheduled deal to `posted` on success, or to `post_failed` on failure.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    request_body = PostResultRequest,
    responses(
        (status = 200, description = "Updated deal", body = DealDto),
        (status = 404, description = "Deal not found", body = ErrorResponse),
        (status = 409, description = "Deal is not awaiting publication", body = ErrorResponse),
    )
)]
pub async fn post_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostResultRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal = state
        .deal_service
        .record_post_result(DealId::from_uuid(id), req.into_result())
        .await?;
    Ok(Json(DealDto::from(deal)))
}

/// `GET /deals/{id}/escrow` — Amount held for a deal.
///
/// # Errors
///
/// Returns [`ServiceError::DealNotFound`] if the deal does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/deals/{id}/escrow",
    tag = "Deals",
    summary = "Get held escrow",
    description = "Returns the amount the ledger still holds for the deal: escrow debits minus payouts and refunds.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
    ),
    responses(
        (status = 200, description = "Held amount", body = EscrowResponse),
        (status = 404, description = "Deal not found", body = ErrorResponse),
    )
)]
pub async fn get_escrow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let deal_id = DealId::from_uuid(id);
    let deal = state.deal_service.get_deal(deal_id).await?;
    let held = state.deal_service.escrow_held(deal_id).await?;
    Ok(Json(EscrowResponse {
        deal_id: id,
        held: held.to_string(),
        currency: deal.price_currency.into(),
        status: deal.status,
    }))
}

/// Deal routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deals", post(create_deal).get(list_deals))
        .route("/deals/{id}", get(get_deal))
        .route("/deals/{id}/approval", post(approve_deal))
        .route("/deals/{id}/actions", post(apply_action))
        .route("/deals/{id}/post-result", post(post_result))
        .route("/deals/{id}/escrow", get(get_escrow))
}
