//! PostgreSQL implementation of the persistence layer.
//!
//! [`Store::commit`] runs inside a single database transaction. The deal
//! row is locked with `SELECT ... FOR UPDATE`, escrow draw-downs take a
//! transaction-scoped advisory lock on the deal, and balance updates are
//! conditional on the result staying non-negative. Any failure rolls the
//! transaction back when it is dropped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{DealRow, TransactionRow, WalletRow};
use super::{Commit, CommitReceipt, DealRepository, LedgerStore, Store};
use crate::domain::money::{AMOUNT_LIMIT, ensure_storable};
use crate::domain::{
    Currency, Deal, DealFilter, DealId, LedgerTransaction, TransactionId, TransactionKind, UserId,
    Wallet, WalletId,
};
use crate::error::ServiceError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const WALLET_COLUMNS: &str = "id, user_id, currency, balance, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, amount, kind, reference_id, description, created_at";
const DEAL_COLUMNS: &str = "id, advertiser_id, channel_id, channel_owner_id, campaign_id, \
     price_amount, price_currency, brief, creative, status, created_at, updated_at, \
     payment_confirmed_at, payout_at, refund_at, actual_post_time, rejection_reason, \
     proposed_post_time, proposed_by, agreed_post_time, post_error";

/// PostgreSQL-backed [`Store`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the SQL migrations embedded in the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), ServiceError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| ServiceError::PersistenceError(e.to_string()))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    async fn select_wallet(
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: WalletId,
    ) -> Result<Option<Wallet>, ServiceError> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;
        row.map(Wallet::try_from).transpose()
    }

    async fn held_for(
        tx: &mut Transaction<'static, Postgres>,
        deal_id: DealId,
    ) -> Result<Decimal, ServiceError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(deal_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        let held = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(-SUM(amount), 0) FROM transactions \
             WHERE reference_id = $1 AND kind IN ('escrow', 'payout', 'refund')",
        )
        .bind(deal_id.as_uuid())
        .fetch_one(&mut **tx)
        .await?;
        Ok(held)
    }

    async fn insert_transaction(
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: WalletId,
        amount: Decimal,
        kind: TransactionKind,
        reference_id: Option<DealId>,
        description: Option<&str>,
    ) -> Result<LedgerTransaction, ServiceError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions (id, wallet_id, amount, kind, reference_id, description) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(TransactionId::new().as_uuid())
        .bind(wallet_id.as_uuid())
        .bind(amount)
        .bind(kind.as_str())
        .bind(reference_id.map(Uuid::from))
        .bind(description)
        .fetch_one(&mut **tx)
        .await?;
        LedgerTransaction::try_from(row)
    }

    async fn update_deal(
        tx: &mut Transaction<'static, Postgres>,
        deal: &Deal,
        expected_status: &str,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE deals SET creative = $3, status = $4, updated_at = $5, \
             payment_confirmed_at = $6, payout_at = $7, refund_at = $8, actual_post_time = $9, \
             rejection_reason = $10, proposed_post_time = $11, proposed_by = $12, \
             agreed_post_time = $13, post_error = $14 \
             WHERE id = $1 AND status = $2",
        )
        .bind(deal.id.as_uuid())
        .bind(expected_status)
        .bind(deal.creative.as_deref())
        .bind(deal.status.as_str())
        .bind(deal.updated_at)
        .bind(deal.payment_confirmed_at)
        .bind(deal.payout_at)
        .bind(deal.refund_at)
        .bind(deal.actual_post_time)
        .bind(deal.rejection_reason.as_deref())
        .bind(deal.proposed_post_time)
        .bind(deal.proposed_by.map(UserId::get))
        .bind(deal.agreed_post_time)
        .bind(deal.post_error.as_deref())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn find_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
    ) -> Result<Option<Wallet>, ServiceError> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE user_id IS NOT DISTINCT FROM $1 AND currency = $2"
        ))
        .bind(user_id.map(UserId::get))
        .bind(currency.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Wallet::try_from).transpose()
    }

    async fn create_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
        opening_balance: Decimal,
    ) -> Result<Wallet, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let opening = ensure_storable(opening_balance.max(Decimal::ZERO))?;

        let inserted = sqlx::query_as::<_, WalletRow>(&format!(
            "INSERT INTO wallets (id, user_id, currency, balance) VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT wallets_owner_currency DO NOTHING \
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(WalletId::new().as_uuid())
        .bind(user_id.map(UserId::get))
        .bind(currency.as_str())
        .bind(opening)
        .fetch_optional(&mut *tx)
        .await?;

        let wallet = match inserted {
            Some(row) => {
                let wallet = Wallet::try_from(row)?;
                if opening > Decimal::ZERO {
                    Self::insert_transaction(
                        &mut tx,
                        wallet.id,
                        opening,
                        TransactionKind::Deposit,
                        None,
                        Some("opening balance"),
                    )
                    .await?;
                }
                wallet
            }
            None => {
                let row = sqlx::query_as::<_, WalletRow>(&format!(
                    "SELECT {WALLET_COLUMNS} FROM wallets \
                     WHERE user_id IS NOT DISTINCT FROM $1 AND currency = $2"
                ))
                .bind(user_id.map(UserId::get))
                .bind(currency.as_str())
                .fetch_one(&mut *tx)
                .await?;
                Wallet::try_from(row)?
            }
        };

        tx.commit().await?;
        Ok(wallet)
    }

    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE wallet_id = $1 ORDER BY created_at ASC"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LedgerTransaction::try_from).collect()
    }

    async fn deal_transactions(
        &self,
        deal_id: DealId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE reference_id = $1 ORDER BY created_at ASC"
        ))
        .bind(deal_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LedgerTransaction::try_from).collect()
    }
}

#[async_trait]
impl DealRepository for PostgresStore {
    async fn insert_deal(&self, deal: &Deal) -> Result<(), ServiceError> {
        sqlx::query(&format!(
            "INSERT INTO deals ({DEAL_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        ))
        .bind(deal.id.as_uuid())
        .bind(deal.advertiser_id.get())
        .bind(deal.channel_id.get())
        .bind(deal.channel_owner_id.get())
        .bind(deal.campaign_id.map(Uuid::from))
        .bind(deal.price_amount)
        .bind(deal.price_currency.as_str())
        .bind(&deal.brief)
        .bind(deal.creative.as_deref())
        .bind(deal.status.as_str())
        .bind(deal.created_at)
        .bind(deal.updated_at)
        .bind(deal.payment_confirmed_at)
        .bind(deal.payout_at)
        .bind(deal.refund_at)
        .bind(deal.actual_post_time)
        .bind(deal.rejection_reason.as_deref())
        .bind(deal.proposed_post_time)
        .bind(deal.proposed_by.map(UserId::get))
        .bind(deal.agreed_post_time)
        .bind(deal.post_error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_deal(&self, deal_id: DealId) -> Result<Option<Deal>, ServiceError> {
        let row = sqlx::query_as::<_, DealRow>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1"
        ))
        .bind(deal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Deal::try_from).transpose()
    }

    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, ServiceError> {
        let rows = sqlx::query_as::<_, DealRow>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals \
             WHERE ($1::bigint IS NULL OR advertiser_id = $1) \
               AND ($2::bigint IS NULL OR channel_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY created_at DESC"
        ))
        .bind(filter.advertiser_id.map(UserId::get))
        .bind(filter.channel_id.map(|c| c.get()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Deal::try_from).collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn commit(&self, commit: Commit) -> Result<CommitReceipt, ServiceError> {
        let mut tx = self.pool.begin().await?;

        if let Some(write) = &commit.deal {
            let stored = sqlx::query_scalar::<_, String>(
                "SELECT status FROM deals WHERE id = $1 FOR UPDATE",
            )
            .bind(write.deal.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::DealNotFound(write.deal.id))?;
            if stored != write.expected_status.as_str() {
                return Err(ServiceError::ConcurrentModification(write.deal.id));
            }
        }

        let mut receipt = CommitReceipt::default();
        for m in &commit.mutations {
            if m.kind.draws_escrow()
                && let Some(deal_id) = m.reference_id
            {
                let held = Self::held_for(&mut tx, deal_id).await?;
                if held < m.amount {
                    return Err(ServiceError::EscrowExhausted {
                        deal_id,
                        held,
                        requested: m.amount,
                    });
                }
            }

            let updated = sqlx::query_as::<_, WalletRow>(&format!(
                "UPDATE wallets SET balance = balance + $1, updated_at = now() \
                 WHERE id = $2 AND balance + $1 >= 0 AND balance + $1 < $3 \
                 RETURNING {WALLET_COLUMNS}"
            ))
            .bind(m.amount)
            .bind(m.wallet_id.as_uuid())
            .bind(AMOUNT_LIMIT)
            .fetch_optional(&mut *tx)
            .await?;

            let wallet = match updated {
                Some(row) => Wallet::try_from(row)?,
                None => {
                    let current = Self::select_wallet(&mut tx, m.wallet_id)
                        .await?
                        .ok_or_else(|| ServiceError::WalletNotFound(m.wallet_id.to_string()))?;
                    if m.amount > Decimal::ZERO {
                        return Err(ServiceError::InvalidAmount(m.amount));
                    }
                    return Err(ServiceError::InsufficientFunds {
                        available: current.balance,
                        requested: -m.amount,
                    });
                }
            };

            let entry = Self::insert_transaction(
                &mut tx,
                m.wallet_id,
                m.amount,
                m.kind,
                m.reference_id,
                m.description.as_deref(),
            )
            .await?;
            receipt.wallets.push(wallet);
            receipt.transactions.push(entry);
        }

        if let Some(write) = commit.deal {
            let affected =
                Self::update_deal(&mut tx, &write.deal, write.expected_status.as_str()).await?;
            if affected == 0 {
                return Err(ServiceError::ConcurrentModification(write.deal.id));
            }
            receipt.deal = Some(write.deal);
        }

        tx.commit().await?;
        Ok(receipt)
    }
}
