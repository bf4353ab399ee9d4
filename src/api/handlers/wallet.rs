//! Wallet handlers: balance, deposit and ledger history.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CurrencyQuery, DepositRequest, TransactionDto, TransactionListQuery, TransactionListResponse,
    WalletDto, paginate, parse_amount, parse_currency,
};
use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::{ErrorResponse, ServiceError};

/// `GET /wallets/{user_id}` — Wallet balance.
///
/// # Errors
///
/// Returns [`ServiceError::WalletNotFound`] if the user has no wallet in
/// that currency.
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{user_id}",
    tag = "Wallets",
    summary = "Get a wallet",
    params(
        ("user_id" = i64, Path, description = "Telegram user ID"),
        CurrencyQuery,
    ),
    responses(
        (status = 200, description = "Wallet", body = WalletDto),
        (status = 400, description = "Missing or invalid currency", body = ErrorResponse),
        (status = 404, description = "Wallet not found", body = ErrorResponse),
    )
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<CurrencyQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let currency = parse_currency(query.currency.as_deref())?;
    let wallet = state
        .wallet_service
        .wallet(UserId(user_id), &currency)
        .await?;
    Ok(Json(WalletDto::from(wallet)))
}

/// `POST /wallets/{user_id}/deposit` — Credit a wallet.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidAmount`] on a non-positive amount.
#[utoipa::path(
    post,
    path = "/api/v1/wallets/{user_id}/deposit",
    tag = "Wallets",
    summary = "Deposit funds",
    description = "Credits the user's wallet in the given currency, opening it if needed, and records a `deposit` ledger entry.",
    params(
        ("user_id" = i64, Path, description = "Telegram user ID"),
    ),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Updated wallet", body = WalletDto),
        (status = 400, description = "Invalid amount or currency", body = ErrorResponse),
    )
)]
pub async fn deposit(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let amount = parse_amount(req.amount.as_deref(), "amount")?;
    let currency = parse_currency(req.currency.as_deref())?;
    let wallet = state
        .wallet_service
        .deposit(UserId(user_id), amount, &currency)
        .await?;
    Ok(Json(WalletDto::from(wallet)))
}

/// `GET /wallets/{user_id}/transactions` — Ledger history.
///
/// # Errors
///
/// Returns [`ServiceError::WalletNotFound`] if the user has no wallet in
/// that currency.
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{user_id}/transactions",
    tag = "Wallets",
    summary = "List ledger entries",
    description = "Returns the wallet's ledger entries oldest first. Their amounts always sum to the balance.",
    params(
        ("user_id" = i64, Path, description = "Telegram user ID"),
        TransactionListQuery,
    ),
    responses(
        (status = 200, description = "Paginated ledger", body = TransactionListResponse),
        (status = 404, description = "Wallet not found", body = ErrorResponse),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<TransactionListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let currency = parse_currency(query.currency.as_deref())?;
    let entries = state
        .wallet_service
        .transactions(UserId(user_id), &currency)
        .await?;
    let (page, pagination) = paginate(entries, query.page, query.per_page);
    Ok(Json(TransactionListResponse {
        data: page.into_iter().map(TransactionDto::from).collect(),
        pagination,
    }))
}

/// Wallet routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallets/{user_id}", get(get_wallet))
        .route("/wallets/{user_id}/deposit", post(deposit))
        .route("/wallets/{user_id}/transactions", get(list_transactions))
}
