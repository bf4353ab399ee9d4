//! Wallet service: balances, escrow and the ledger.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::ledger::held_in_escrow;
use crate::domain::money::ensure_positive;
use crate::domain::{Currency, DealId, LedgerTransaction, TransactionKind, UserId, Wallet};
use crate::error::ServiceError;
use crate::persistence::{Commit, CommitReceipt, LedgerMutation, Store};

/// Leaf component owning wallet balances.
///
/// Escrow is ledger-implicit: an escrow debit is not credited to any other
/// wallet. What a deal still holds is recomputed from its ledger entries,
/// and payouts or refunds beyond that amount are refused.
#[derive(Debug, Clone)]
pub struct WalletService {
    store: Arc<dyn Store>,
    starting_balance: Decimal,
}

impl WalletService {
    /// Creates a service; new wallets open with `starting_balance`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, starting_balance: Decimal) -> Self {
        Self {
            store,
            starting_balance,
        }
    }

    /// Returns the wallet of `user_id` in `currency`, creating it on
    /// first access.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    pub async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        currency: &Currency,
    ) -> Result<Wallet, ServiceError> {
        if let Some(wallet) = self.store.find_wallet(Some(user_id), currency).await? {
            return Ok(wallet);
        }
        let wallet = self
            .store
            .create_wallet(Some(user_id), currency, self.starting_balance)
            .await?;
        tracing::info!(%user_id, wallet_id = %wallet.id, %currency, "wallet opened");
        Ok(wallet)
    }

    /// Returns an existing wallet.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WalletNotFound`] if the user has no wallet
    /// in `currency`.
    pub async fn wallet(&self, user_id: UserId, currency: &Currency) -> Result<Wallet, ServiceError> {
        self.store
            .find_wallet(Some(user_id), currency)
            .await?
            .ok_or_else(|| ServiceError::WalletNotFound(format!("{user_id}/{currency}")))
    }

    /// Returns the ledger entries of a user's wallet, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WalletNotFound`] if the user has no wallet
    /// in `currency`.
    pub async fn transactions(
        &self,
        user_id: UserId,
        currency: &Currency,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let wallet = self.wallet(user_id, currency).await?;
        self.store.wallet_transactions(wallet.id).await
    }

    /// Credits `amount` to the user's wallet.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidAmount`] if `amount <= 0`.
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<Wallet, ServiceError> {
        let amount = ensure_positive(amount)?;
        let wallet = self.get_or_create_wallet(user_id, currency).await?;
        let receipt = self
            .apply(LedgerMutation {
                wallet_id: wallet.id,
                amount,
                kind: TransactionKind::Deposit,
                reference_id: None,
                description: Some("deposit".to_string()),
            })
            .await?;
        tracing::info!(%user_id, %amount, %currency, "deposit recorded");
        receipt
            .wallets
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Internal("deposit wrote no wallet".to_string()))
    }

    /// Debits `amount` from `payer` and holds it for `deal_id`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidAmount`] if `amount <= 0`.
    /// - [`ServiceError::InsufficientFunds`] if the balance is lower than
    ///   `amount`; nothing is written.
    pub async fn escrow(
        &self,
        deal_id: DealId,
        payer: UserId,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<LedgerTransaction, ServiceError> {
        let mutation = self
            .mutation(TransactionKind::Escrow, deal_id, payer, amount, currency)
            .await?;
        Self::single_entry(self.apply(mutation).await?)
    }

    /// Pays `amount` held for `deal_id` out to `payee`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidAmount`] if `amount <= 0`.
    /// - [`ServiceError::EscrowExhausted`] if the deal holds less than
    ///   `amount`.
    pub async fn release(
        &self,
        deal_id: DealId,
        payee: UserId,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<LedgerTransaction, ServiceError> {
        let mutation = self
            .mutation(TransactionKind::Payout, deal_id, payee, amount, currency)
            .await?;
        Self::single_entry(self.apply(mutation).await?)
    }

    /// Returns `amount` held for `deal_id` to `payer`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidAmount`] if `amount <= 0`.
    /// - [`ServiceError::EscrowExhausted`] if the deal holds less than
    ///   `amount`.
    pub async fn refund(
        &self,
        deal_id: DealId,
        payer: UserId,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<LedgerTransaction, ServiceError> {
        let mutation = self
            .mutation(TransactionKind::Refund, deal_id, payer, amount, currency)
            .await?;
        Self::single_entry(self.apply(mutation).await?)
    }

    /// Returns what the ledger still holds for `deal_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    pub async fn escrow_held(&self, deal_id: DealId) -> Result<Decimal, ServiceError> {
        let entries = self.store.deal_transactions(deal_id).await?;
        Ok(held_in_escrow(&entries))
    }

    /// Builds the signed ledger mutation for a deal-scoped movement
    /// without applying it, so the caller can commit it together with a
    /// deal write.
    pub(crate) async fn mutation(
        &self,
        kind: TransactionKind,
        deal_id: DealId,
        user_id: UserId,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<LedgerMutation, ServiceError> {
        let amount = ensure_positive(amount)?;
        let wallet = self.get_or_create_wallet(user_id, currency).await?;
        let signed = match kind {
            TransactionKind::Escrow => -amount,
            TransactionKind::Deposit | TransactionKind::Payout | TransactionKind::Refund => amount,
        };
        Ok(LedgerMutation {
            wallet_id: wallet.id,
            amount: signed,
            kind,
            reference_id: Some(deal_id),
            description: Some(format!("{kind} for deal {deal_id}")),
        })
    }

    async fn apply(&self, mutation: LedgerMutation) -> Result<CommitReceipt, ServiceError> {
        let wallet_id = mutation.wallet_id;
        let kind = mutation.kind;
        let receipt = self
            .store
            .commit(Commit {
                mutations: vec![mutation],
                deal: None,
            })
            .await
            .inspect_err(|err| {
                tracing::warn!(%wallet_id, %kind, error = %err, "ledger write refused");
            })?;
        Ok(receipt)
    }

    fn single_entry(receipt: CommitReceipt) -> Result<LedgerTransaction, ServiceError> {
        receipt
            .transactions
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Internal("ledger write produced no entry".to_string()))
    }
}
