//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the central error type for the crate. Business-rule
//! failures (invalid amount, insufficient funds, illegal transitions) are
//! returned to the caller as typed variants and are never retried
//! automatically. Each variant maps to a numeric code and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ActionKind, DealId, DealStatus, UserId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient funds: available 100, requested 500"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`ServiceError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status                      |
/// |-----------|----------------------|----------------------------------|
/// | 1000–1999 | Validation           | 400 Bad Request                  |
/// | 2000–2099 | Not Found            | 404 Not Found                    |
/// | 2100–2199 | Deal State           | 409 Conflict                     |
/// | 2200–2299 | Authorization        | 403 Forbidden                    |
/// | 3000–3999 | Server               | 500 Internal Server Error        |
/// | 4000–4999 | Ledger               | 422 Unprocessable Entity         |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request validation failed (missing or malformed fields).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Amount that is not positive or does not fit `NUMERIC(20, 8)`.
    #[error("invalid amount {0}: must be positive, below 10^12 with at most 8 decimal places")]
    InvalidAmount(Decimal),

    /// Wallet operation requested in a currency other than the deal's.
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        /// Currency the deal is priced in.
        expected: String,
        /// Currency supplied by the caller.
        actual: String,
    },

    /// Deal with the given ID was not found.
    #[error("deal not found: {0}")]
    DealNotFound(DealId),

    /// No wallet exists for the given owner and currency.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// The requested action is not legal from the deal's current status.
    #[error("invalid transition: cannot {action} a deal in status {from}")]
    InvalidTransition {
        /// Status the deal was in when the action was requested.
        from: DealStatus,
        /// Requested action.
        action: ActionKind,
    },

    /// Another writer changed the deal (or held its lock) concurrently.
    #[error("concurrent modification of deal {0}; re-read and retry")]
    ConcurrentModification(DealId),

    /// Funds cannot be released before the monitoring window elapses.
    #[error("monitoring window for deal {deal_id} is open until {until}")]
    MonitoringWindowOpen {
        /// Deal under monitoring.
        deal_id: DealId,
        /// Earliest instant at which funds may be released.
        until: DateTime<Utc>,
    },

    /// The acting user is not the participant the action requires.
    #[error("user {user_id} is not allowed to act on deal {deal_id} in this role")]
    NotParticipant {
        /// Acting user.
        user_id: UserId,
        /// Target deal.
        deal_id: DealId,
    },

    /// System-role action sent to a public endpoint.
    #[error("system actions are not accepted on the public API")]
    SystemRoleForbidden,

    /// Escrow requested beyond the payer's available balance.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the check.
        available: Decimal,
        /// Amount the operation needed.
        requested: Decimal,
    },

    /// Payout or refund would exceed what is still held for the deal.
    #[error("escrow for deal {deal_id} holds {held}, cannot move {requested}")]
    EscrowExhausted {
        /// Deal whose escrow was consulted.
        deal_id: DealId,
        /// Amount still held according to the ledger.
        held: Decimal,
        /// Amount the operation needed.
        requested: Decimal,
    },

    /// Persistence layer failure. Nothing from the failed operation landed.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidAmount(_) => 1002,
            Self::CurrencyMismatch { .. } => 1003,
            Self::DealNotFound(_) => 2001,
            Self::WalletNotFound(_) => 2002,
            Self::InvalidTransition { .. } => 2101,
            Self::ConcurrentModification(_) => 2102,
            Self::MonitoringWindowOpen { .. } => 2103,
            Self::NotParticipant { .. } => 2201,
            Self::SystemRoleForbidden => 2202,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::InsufficientFunds { .. } => 4001,
            Self::EscrowExhausted { .. } => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidAmount(_) | Self::CurrencyMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::DealNotFound(_) | Self::WalletNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. }
            | Self::ConcurrentModification(_)
            | Self::MonitoringWindowOpen { .. } => StatusCode::CONFLICT,
            Self::NotParticipant { .. } | Self::SystemRoleForbidden => StatusCode::FORBIDDEN,
            Self::InsufficientFunds { .. } | Self::EscrowExhausted { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for business-rule failures the caller must surface
    /// to the user rather than retry.
    #[must_use]
    pub const fn is_business_failure(&self) -> bool {
        !matches!(self, Self::PersistenceError(_) | Self::Internal(_))
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let details = match &self {
            Self::InsufficientFunds { .. } => Some("top up the wallet and retry".to_string()),
            Self::ConcurrentModification(_) => Some("re-read the deal before retrying".to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
