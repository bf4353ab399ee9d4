//! Persistence layer: wallet ledger and deal storage.
//!
//! [`LedgerStore`] and [`DealRepository`] are the read/insert contracts of
//! the two leaf components. Every write that changes a balance or a deal
//! status goes through [`Store::commit`], which applies a batch of ledger
//! mutations and an optional status-guarded deal write as one
//! all-or-nothing unit.
//!
//! Two backends exist: [`memory::MemoryStore`] (tests and demo mode) and
//! [`postgres::PostgresStore`] (`sqlx::PgPool`).

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    Currency, Deal, DealFilter, DealId, DealStatus, LedgerTransaction, TransactionKind, UserId,
    Wallet, WalletId,
};
use crate::error::ServiceError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// One balance change plus the ledger entry recording it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMutation {
    /// Wallet to mutate.
    pub wallet_id: WalletId,
    /// Signed amount added to the balance.
    pub amount: Decimal,
    /// Entry kind.
    pub kind: TransactionKind,
    /// Deal the entry is made for.
    pub reference_id: Option<DealId>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Deal write guarded by the status the writer observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealWrite {
    /// New deal state.
    pub deal: Deal,
    /// Status the stored deal must still have for the write to land.
    pub expected_status: DealStatus,
}

/// Atomic unit of work.
///
/// Ledger mutations are applied in order, then the deal write. If any step
/// fails nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    /// Balance changes to apply.
    pub mutations: Vec<LedgerMutation>,
    /// Optional deal write.
    pub deal: Option<DealWrite>,
}

/// What a successful [`Store::commit`] wrote.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Wallets after mutation, in mutation order.
    pub wallets: Vec<Wallet>,
    /// Ledger entries created, in mutation order.
    pub transactions: Vec<LedgerTransaction>,
    /// Deal as written.
    pub deal: Option<Deal>,
}

/// Durable wallet balances and transaction history.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Finds the wallet of `user_id` in `currency`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn find_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
    ) -> Result<Option<Wallet>, ServiceError>;

    /// Creates the wallet of `user_id` in `currency`, or returns the
    /// existing one. A positive `opening_balance` is recorded as a
    /// `deposit` entry in the same write.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn create_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
        opening_balance: Decimal,
    ) -> Result<Wallet, ServiceError>;

    /// Returns a wallet's ledger entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError>;

    /// Returns every ledger entry referencing a deal, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn deal_transactions(
        &self,
        deal_id: DealId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError>;
}

/// Durable deal records.
#[async_trait]
pub trait DealRepository: Send + Sync + fmt::Debug {
    /// Inserts a new deal.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure or a
    /// duplicate ID.
    async fn insert_deal(&self, deal: &Deal) -> Result<(), ServiceError>;

    /// Finds a deal by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn find_deal(&self, deal_id: DealId) -> Result<Option<Deal>, ServiceError>;

    /// Lists deals matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, ServiceError>;
}

/// Combined store with the atomic commit spanning both tables.
#[async_trait]
pub trait Store: LedgerStore + DealRepository {
    /// Applies `commit` all-or-nothing.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::DealNotFound`] if the written deal does not exist.
    /// - [`ServiceError::ConcurrentModification`] if the stored status is
    ///   not the expected one.
    /// - [`ServiceError::WalletNotFound`] if a mutated wallet is missing.
    /// - [`ServiceError::InsufficientFunds`] if a debit would make a
    ///   balance negative.
    /// - [`ServiceError::EscrowExhausted`] if a payout or refund exceeds
    ///   what the ledger still holds for its deal.
    /// - [`ServiceError::PersistenceError`] on storage failure.
    async fn commit(&self, commit: Commit) -> Result<CommitReceipt, ServiceError>;
}
