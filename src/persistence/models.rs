//! Database row models for wallets, transactions and deals.
//!
//! Rows carry the column types PostgreSQL returns; `TryFrom` converts
//! them into domain types, failing on values the domain rejects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    CampaignId, ChannelId, Currency, Deal, DealId, LedgerTransaction, TransactionId, UserId,
    Wallet, WalletId,
};
use crate::error::ServiceError;

/// A row from the `wallets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletRow {
    /// Wallet ID.
    pub id: Uuid,
    /// Owning Telegram user; `NULL` for system wallets.
    pub user_id: Option<i64>,
    /// Currency code.
    pub currency: String,
    /// Balance, constrained non-negative.
    pub balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = ServiceError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: WalletId::from_uuid(row.id),
            user_id: row.user_id.map(UserId),
            currency: Currency::new(&row.currency)
                .map_err(|e| ServiceError::PersistenceError(e.to_string()))?,
            balance: row.balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    /// Entry ID.
    pub id: Uuid,
    /// Wallet the entry belongs to.
    pub wallet_id: Uuid,
    /// Signed amount.
    pub amount: Decimal,
    /// Entry kind (`deposit`, `escrow`, `payout`, `refund`).
    pub kind: String,
    /// Referenced deal.
    pub reference_id: Option<Uuid>,
    /// Description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for LedgerTransaction {
    type Error = ServiceError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransactionId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            amount: row.amount,
            kind: row
                .kind
                .parse()
                .map_err(|e: ServiceError| ServiceError::PersistenceError(e.to_string()))?,
            reference_id: row.reference_id.map(DealId::from_uuid),
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// A row from the `deals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DealRow {
    /// Deal ID.
    pub id: Uuid,
    /// Advertiser chat ID.
    pub advertiser_id: i64,
    /// Channel chat ID.
    pub channel_id: i64,
    /// Channel owner chat ID.
    pub channel_owner_id: i64,
    /// Originating campaign.
    pub campaign_id: Option<Uuid>,
    /// Price.
    pub price_amount: Decimal,
    /// Price currency code.
    pub price_currency: String,
    /// Brief.
    pub brief: String,
    /// Submitted creative.
    pub creative: Option<String>,
    /// Status string.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
    /// Escrow debit timestamp.
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    /// Payout timestamp.
    pub payout_at: Option<DateTime<Utc>>,
    /// Refund timestamp.
    pub refund_at: Option<DateTime<Utc>>,
    /// Publication timestamp.
    pub actual_post_time: Option<DateTime<Utc>>,
    /// Rejection, change or dispute reason.
    pub rejection_reason: Option<String>,
    /// Proposed publication time.
    pub proposed_post_time: Option<DateTime<Utc>>,
    /// Proposer of the publication time.
    pub proposed_by: Option<i64>,
    /// Agreed publication time.
    pub agreed_post_time: Option<DateTime<Utc>>,
    /// Last publication error.
    pub post_error: Option<String>,
}

impl TryFrom<DealRow> for Deal {
    type Error = ServiceError;

    fn try_from(row: DealRow) -> Result<Self, Self::Error> {
        let corrupt = |e: ServiceError| ServiceError::PersistenceError(e.to_string());
        Ok(Self {
            id: DealId::from_uuid(row.id),
            advertiser_id: UserId(row.advertiser_id),
            channel_id: ChannelId(row.channel_id),
            channel_owner_id: UserId(row.channel_owner_id),
            campaign_id: row.campaign_id.map(CampaignId::from_uuid),
            price_amount: row.price_amount,
            price_currency: Currency::new(&row.price_currency).map_err(corrupt)?,
            brief: row.brief,
            creative: row.creative,
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            payment_confirmed_at: row.payment_confirmed_at,
            payout_at: row.payout_at,
            refund_at: row.refund_at,
            actual_post_time: row.actual_post_time,
            rejection_reason: row.rejection_reason,
            proposed_post_time: row.proposed_post_time,
            proposed_by: row.proposed_by.map(UserId),
            agreed_post_time: row.agreed_post_time,
            post_error: row.post_error,
        })
    }
}
