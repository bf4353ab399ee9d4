//! Wallet and ledger DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common_dto::{PaginationMeta, default_page, default_per_page};
use crate::domain::{LedgerTransaction, Wallet};

/// Currency selector for wallet reads.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CurrencyQuery {
    /// Currency code (e.g. `USD`).
    pub currency: Option<String>,
}

/// Query parameters for `GET /wallets/{user_id}/transactions`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionListQuery {
    /// Currency code (e.g. `USD`).
    pub currency: Option<String>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Request body for `POST /wallets/{user_id}/deposit`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    /// Amount as a decimal string.
    pub amount: Option<String>,
    /// Currency code.
    pub currency: Option<String>,
}

/// Wallet representation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletDto {
    /// Wallet identifier.
    pub wallet_id: Uuid,
    /// Owning user.
    pub user_id: Option<i64>,
    /// Currency code.
    pub currency: String,
    /// Balance as a decimal string.
    pub balance: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletDto {
    fn from(wallet: Wallet) -> Self {
        Self {
            wallet_id: wallet.id.into(),
            user_id: wallet.user_id.map(|u| u.get()),
            currency: wallet.currency.into(),
            balance: wallet.balance.to_string(),
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
        }
    }
}

/// Ledger entry representation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionDto {
    /// Entry identifier.
    pub transaction_id: Uuid,
    /// Wallet identifier.
    pub wallet_id: Uuid,
    /// Signed amount as a decimal string.
    pub amount: String,
    /// `deposit`, `escrow`, `payout` or `refund`.
    pub kind: String,
    /// Deal the entry was made for.
    pub reference_id: Option<Uuid>,
    /// Description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<LedgerTransaction> for TransactionDto {
    fn from(entry: LedgerTransaction) -> Self {
        Self {
            transaction_id: entry.id.into(),
            wallet_id: entry.wallet_id.into(),
            amount: entry.amount.to_string(),
            kind: entry.kind.as_str().to_string(),
            reference_id: entry.reference_id.map(Uuid::from),
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}

/// Response body for `GET /wallets/{user_id}/transactions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// Entries on this page, oldest first.
    pub data: Vec<TransactionDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
