//! In-memory store used by tests and demo deployments.
//!
//! All tables live behind one [`tokio::sync::RwLock`]. A commit takes the
//! write lock, validates every step against a scratch copy of the touched
//! wallets, and only then applies the batch, which gives the same
//! all-or-nothing behavior as a database transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{Commit, CommitReceipt, DealRepository, LedgerStore, Store};
use crate::domain::ledger::held_in_escrow;
use crate::domain::money::ensure_storable;
use crate::domain::{
    Currency, Deal, DealFilter, DealId, LedgerTransaction, TransactionId, TransactionKind, UserId,
    Wallet, WalletId,
};
use crate::error::ServiceError;

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<WalletId, Wallet>,
    wallet_index: HashMap<(Option<UserId>, Currency), WalletId>,
    transactions: Vec<LedgerTransaction>,
    deals: HashMap<DealId, Deal>,
}

impl Tables {
    fn deal_entries(&self, deal_id: DealId) -> impl Iterator<Item = &LedgerTransaction> {
        self.transactions
            .iter()
            .filter(move |t| t.reference_id == Some(deal_id))
    }
}

/// Process-local [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing_commits: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with a persistence error before
    /// anything is written. Used to exercise infrastructure failures.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Returns every ledger entry, oldest first.
    pub async fn all_transactions(&self) -> Vec<LedgerTransaction> {
        self.tables.read().await.transactions.clone()
    }

    /// Returns every wallet.
    pub async fn all_wallets(&self) -> Vec<Wallet> {
        self.tables.read().await.wallets.values().cloned().collect()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
    ) -> Result<Option<Wallet>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .wallet_index
            .get(&(user_id, currency.clone()))
            .and_then(|id| tables.wallets.get(id))
            .cloned())
    }

    async fn create_wallet(
        &self,
        user_id: Option<UserId>,
        currency: &Currency,
        opening_balance: Decimal,
    ) -> Result<Wallet, ServiceError> {
        let mut tables = self.tables.write().await;
        let key = (user_id, currency.clone());
        if let Some(existing) = tables.wallet_index.get(&key).and_then(|id| tables.wallets.get(id))
        {
            return Ok(existing.clone());
        }

        ensure_storable(opening_balance)?;
        let mut wallet = Wallet::new(user_id, currency.clone());
        if opening_balance > Decimal::ZERO {
            wallet.balance = opening_balance;
            tables.transactions.push(LedgerTransaction {
                id: TransactionId::new(),
                wallet_id: wallet.id,
                amount: opening_balance,
                kind: TransactionKind::Deposit,
                reference_id: None,
                description: Some("opening balance".to_string()),
                created_at: wallet.created_at,
            });
        }
        tables.wallet_index.insert(key, wallet.id);
        tables.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn deal_transactions(
        &self,
        deal_id: DealId,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables.deal_entries(deal_id).cloned().collect())
    }
}

#[async_trait]
impl DealRepository for MemoryStore {
    async fn insert_deal(&self, deal: &Deal) -> Result<(), ServiceError> {
        let mut tables = self.tables.write().await;
        if tables.deals.contains_key(&deal.id) {
            return Err(ServiceError::PersistenceError(format!(
                "deal {} already exists",
                deal.id
            )));
        }
        tables.deals.insert(deal.id, deal.clone());
        Ok(())
    }

    async fn find_deal(&self, deal_id: DealId) -> Result<Option<Deal>, ServiceError> {
        Ok(self.tables.read().await.deals.get(&deal_id).cloned())
    }

    async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, ServiceError> {
        let tables = self.tables.read().await;
        let mut deals: Vec<Deal> = tables
            .deals
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deals)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn commit(&self, commit: Commit) -> Result<CommitReceipt, ServiceError> {
        if self.take_injected_failure() {
            return Err(ServiceError::PersistenceError(
                "injected commit failure".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;

        if let Some(write) = &commit.deal {
            let stored = tables
                .deals
                .get(&write.deal.id)
                .ok_or(ServiceError::DealNotFound(write.deal.id))?;
            if stored.status != write.expected_status {
                return Err(ServiceError::ConcurrentModification(write.deal.id));
            }
        }

        // Validate the whole batch against scratch balances first.
        let now = Utc::now();
        let mut scratch: HashMap<WalletId, Wallet> = HashMap::new();
        let mut entries: Vec<LedgerTransaction> = Vec::with_capacity(commit.mutations.len());
        for m in &commit.mutations {
            let wallet = match scratch.get(&m.wallet_id) {
                Some(w) => w.clone(),
                None => tables
                    .wallets
                    .get(&m.wallet_id)
                    .cloned()
                    .ok_or_else(|| ServiceError::WalletNotFound(m.wallet_id.to_string()))?,
            };

            if m.kind.draws_escrow()
                && let Some(deal_id) = m.reference_id
            {
                let pending = entries.iter().filter(|t| t.reference_id == Some(deal_id));
                let held = held_in_escrow(tables.deal_entries(deal_id).chain(pending));
                if held < m.amount {
                    return Err(ServiceError::EscrowExhausted {
                        deal_id,
                        held,
                        requested: m.amount,
                    });
                }
            }

            let balance = wallet
                .balance
                .checked_add(m.amount)
                .ok_or(ServiceError::InvalidAmount(m.amount))?;
            if balance < Decimal::ZERO {
                return Err(ServiceError::InsufficientFunds {
                    available: wallet.balance,
                    requested: -m.amount,
                });
            }
            ensure_storable(balance).map_err(|_| ServiceError::InvalidAmount(m.amount))?;

            let mut updated = wallet;
            updated.balance = balance;
            updated.updated_at = now;
            scratch.insert(updated.id, updated);
            entries.push(LedgerTransaction {
                id: TransactionId::new(),
                wallet_id: m.wallet_id,
                amount: m.amount,
                kind: m.kind,
                reference_id: m.reference_id,
                description: m.description.clone(),
                created_at: now,
            });
        }

        // Apply.
        let mut receipt = CommitReceipt::default();
        for entry in &entries {
            if let Some(wallet) = scratch.get(&entry.wallet_id) {
                receipt.wallets.push(wallet.clone());
            }
        }
        tables.wallets.extend(scratch);
        tables.transactions.extend(entries.iter().cloned());
        receipt.transactions = entries;
        if let Some(write) = commit.deal {
            tables.deals.insert(write.deal.id, write.deal.clone());
            receipt.deal = Some(write.deal);
        }
        Ok(receipt)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, DealStatus, NewDeal};
    use crate::persistence::{DealWrite, LedgerMutation};
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        let Ok(c) = Currency::new("USD") else {
            panic!("valid currency");
        };
        c
    }

    fn deal() -> Deal {
        Deal::from_new(
            NewDeal {
                advertiser_id: UserId(1),
                channel_id: ChannelId(-100),
                channel_owner_id: UserId(2),
                campaign_id: None,
                price_amount: dec!(500),
                price_currency: usd(),
                brief: "brief".to_string(),
                as_draft: false,
            },
            DealStatus::Submitted,
        )
    }

    fn debit(wallet_id: WalletId, amount: Decimal, deal_id: DealId) -> LedgerMutation {
        LedgerMutation {
            wallet_id,
            amount: -amount,
            kind: TransactionKind::Escrow,
            reference_id: Some(deal_id),
            description: None,
        }
    }

    #[tokio::test]
    async fn create_wallet_is_idempotent_and_records_opening_balance() {
        let store = MemoryStore::new();
        let Ok(first) = store.create_wallet(Some(UserId(1)), &usd(), dec!(100)).await else {
            panic!("create failed");
        };
        let Ok(second) = store.create_wallet(Some(UserId(1)), &usd(), dec!(100)).await else {
            panic!("create failed");
        };
        assert_eq!(first.id, second.id);
        assert_eq!(second.balance, dec!(100));

        let entries = store.wallet_transactions(first.id).await.unwrap_or_default();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn failed_step_rolls_back_whole_commit() {
        let store = MemoryStore::new();
        let Ok(wallet) = store.create_wallet(Some(UserId(1)), &usd(), dec!(1000)).await else {
            panic!("create failed");
        };
        let mut d = deal();
        let _ = store.insert_deal(&d).await;
        d.status = DealStatus::Funded;

        // Stale expected status: the debit must not land either.
        let result = store
            .commit(Commit {
                mutations: vec![debit(wallet.id, dec!(500), d.id)],
                deal: Some(DealWrite {
                    deal: d.clone(),
                    expected_status: DealStatus::Draft,
                }),
            })
            .await;
        assert!(matches!(result, Err(ServiceError::ConcurrentModification(_))));

        let Ok(Some(after)) = store.find_wallet(Some(UserId(1)), &usd()).await else {
            panic!("wallet missing");
        };
        assert_eq!(after.balance, dec!(1000));
        assert!(store.deal_transactions(d.id).await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn overdraft_is_rejected() {
        let store = MemoryStore::new();
        let Ok(wallet) = store.create_wallet(Some(UserId(1)), &usd(), dec!(100)).await else {
            panic!("create failed");
        };
        let result = store
            .commit(Commit {
                mutations: vec![debit(wallet.id, dec!(500), DealId::new())],
                deal: None,
            })
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::InsufficientFunds { available, requested })
                if available == dec!(100) && requested == dec!(500)
        ));
    }

    #[tokio::test]
    async fn payout_cannot_exceed_held_escrow() {
        let store = MemoryStore::new();
        let Ok(payer) = store.create_wallet(Some(UserId(1)), &usd(), dec!(500)).await else {
            panic!("create failed");
        };
        let Ok(payee) = store.create_wallet(Some(UserId(2)), &usd(), dec!(0)).await else {
            panic!("create failed");
        };
        let deal_id = DealId::new();
        let payout = LedgerMutation {
            wallet_id: payee.id,
            amount: dec!(500),
            kind: TransactionKind::Payout,
            reference_id: Some(deal_id),
            description: None,
        };

        let early = store
            .commit(Commit {
                mutations: vec![payout.clone()],
                deal: None,
            })
            .await;
        assert!(matches!(early, Err(ServiceError::EscrowExhausted { .. })));

        let batch = Commit {
            mutations: vec![debit(payer.id, dec!(500), deal_id), payout.clone()],
            deal: None,
        };
        assert!(store.commit(batch).await.is_ok());

        let twice = store
            .commit(Commit {
                mutations: vec![payout],
                deal: None,
            })
            .await;
        assert!(matches!(twice, Err(ServiceError::EscrowExhausted { .. })));
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = MemoryStore::new();
        let Ok(wallet) = store.create_wallet(Some(UserId(1)), &usd(), dec!(1000)).await else {
            panic!("create failed");
        };
        store.fail_next_commits(1);
        let result = store
            .commit(Commit {
                mutations: vec![debit(wallet.id, dec!(10), DealId::new())],
                deal: None,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::PersistenceError(_))));
        assert_eq!(store.all_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn credit_past_the_balance_limit_is_rejected() {
        let store = MemoryStore::new();
        let Ok(wallet) = store
            .create_wallet(Some(UserId(1)), &usd(), dec!(999_999_999_999))
            .await
        else {
            panic!("create failed");
        };
        let credit = |amount| Commit {
            mutations: vec![LedgerMutation {
                wallet_id: wallet.id,
                amount,
                kind: TransactionKind::Deposit,
                reference_id: None,
                description: None,
            }],
            deal: None,
        };

        let result = store.commit(credit(dec!(1))).await;
        assert!(matches!(result, Err(ServiceError::InvalidAmount(_))));
        let result = store.commit(credit(Decimal::MAX)).await;
        assert!(matches!(result, Err(ServiceError::InvalidAmount(_))));

        let Ok(Some(after)) = store.find_wallet(Some(UserId(1)), &usd()).await else {
            panic!("wallet missing");
        };
        assert_eq!(after.balance, dec!(999_999_999_999));
        assert!(store.commit(credit(dec!(0.5))).await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = MemoryStore::new();
        let _ = store.insert_deal(&deal()).await;
        let filter = DealFilter {
            status: Some(DealStatus::Funded),
            ..DealFilter::default()
        };
        assert!(store.list_deals(&filter).await.unwrap_or_default().is_empty());
        assert_eq!(
            store
                .list_deals(&DealFilter::default())
                .await
                .unwrap_or_default()
                .len(),
            1
        );
    }
}
