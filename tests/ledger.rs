//! Wallet ledger behavior: escrow success and failure, the concurrent
//! escrow race, and the balance == sum(entries) invariant.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tg_escrow_gateway::domain::{DealId, TransactionKind, UserId};
use tg_escrow_gateway::error::ServiceError;
use tg_escrow_gateway::persistence::{MemoryStore, Store};
use tg_escrow_gateway::service::WalletService;

use common::{ADVERTISER, usd};

fn wallet_service() -> (WalletService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let wallets = WalletService::new(Arc::clone(&store) as Arc<dyn Store>, Decimal::ZERO);
    (wallets, store)
}

#[tokio::test]
async fn escrow_debits_and_records_one_entry() {
    let (wallets, _) = wallet_service();
    let deal_id = DealId::new();
    let _ = wallets.deposit(ADVERTISER, dec!(10000), &usd()).await;

    let Ok(entry) = wallets.escrow(deal_id, ADVERTISER, dec!(500), &usd()).await else {
        panic!("escrow should succeed");
    };
    assert_eq!(entry.amount, dec!(-500));
    assert_eq!(entry.kind, TransactionKind::Escrow);
    assert_eq!(entry.reference_id, Some(deal_id));

    let Ok(wallet) = wallets.wallet(ADVERTISER, &usd()).await else {
        panic!("wallet exists");
    };
    assert_eq!(wallet.balance, dec!(9500));

    let Ok(entries) = wallets.transactions(ADVERTISER, &usd()).await else {
        panic!("ledger readable");
    };
    let escrows: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == TransactionKind::Escrow)
        .collect();
    assert_eq!(escrows.len(), 1);
}

#[tokio::test]
async fn escrow_without_funds_changes_nothing() {
    let (wallets, store) = wallet_service();
    let _ = wallets.deposit(ADVERTISER, dec!(100), &usd()).await;
    let before = store.all_transactions().await.len();

    let result = wallets
        .escrow(DealId::new(), ADVERTISER, dec!(500), &usd())
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::InsufficientFunds { available, requested })
            if available == dec!(100) && requested == dec!(500)
    ));

    let Ok(wallet) = wallets.wallet(ADVERTISER, &usd()).await else {
        panic!("wallet exists");
    };
    assert_eq!(wallet.balance, dec!(100));
    assert_eq!(store.all_transactions().await.len(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_escrows_exactly_one_wins() {
    let (wallets, _) = wallet_service();
    let _ = wallets.deposit(ADVERTISER, dec!(800), &usd()).await;

    let first = {
        let wallets = wallets.clone();
        tokio::spawn(async move {
            wallets
                .escrow(DealId::new(), ADVERTISER, dec!(500), &usd())
                .await
        })
    };
    let second = {
        let wallets = wallets.clone();
        tokio::spawn(async move {
            wallets
                .escrow(DealId::new(), ADVERTISER, dec!(500), &usd())
                .await
        })
    };
    let (Ok(a), Ok(b)) = (first.await, second.await) else {
        panic!("tasks panicked");
    };

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(
        [a, b]
            .into_iter()
            .any(|r| matches!(r, Err(ServiceError::InsufficientFunds { .. })))
    );

    let Ok(wallet) = wallets.wallet(ADVERTISER, &usd()).await else {
        panic!("wallet exists");
    };
    assert_eq!(wallet.balance, dec!(300));
}

#[tokio::test]
async fn refund_cannot_exceed_what_is_held() {
    let (wallets, _) = wallet_service();
    let deal_id = DealId::new();
    let _ = wallets.deposit(ADVERTISER, dec!(1000), &usd()).await;
    let _ = wallets.escrow(deal_id, ADVERTISER, dec!(300), &usd()).await;

    assert!(
        wallets
            .refund(deal_id, ADVERTISER, dec!(300), &usd())
            .await
            .is_ok()
    );
    assert!(matches!(
        wallets.refund(deal_id, ADVERTISER, dec!(300), &usd()).await,
        Err(ServiceError::EscrowExhausted { .. })
    ));
    assert!(matches!(wallets.escrow_held(deal_id).await, Ok(held) if held.is_zero()));
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(u32),
    Escrow(u8, u32),
    Release(u8, u32),
    Refund(u8, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1_u32..5_000).prop_map(Op::Deposit),
        (0_u8..4, 1_u32..5_000).prop_map(|(d, a)| Op::Escrow(d, a)),
        (0_u8..4, 1_u32..5_000).prop_map(|(d, a)| Op::Release(d, a)),
        (0_u8..4, 1_u32..5_000).prop_map(|(d, a)| Op::Refund(d, a)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balances_always_equal_the_sum_of_entries(ops in proptest::collection::vec(op(), 1..40)) {
        let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
            panic!("runtime");
        };
        rt.block_on(async {
            let (wallets, store) = wallet_service();
            let deals: Vec<DealId> = (0..4).map(|_| DealId::new()).collect();
            let owner = UserId(77);
            let deal = |i: u8| deals.get(usize::from(i)).copied().unwrap_or_default();

            for op in ops {
                // Business failures are expected; only the invariant matters.
                let _ = match op {
                    Op::Deposit(a) => wallets.deposit(ADVERTISER, Decimal::from(a), &usd()).await.map(|_| ()),
                    Op::Escrow(d, a) => wallets.escrow(deal(d), ADVERTISER, Decimal::from(a), &usd()).await.map(|_| ()),
                    Op::Release(d, a) => wallets.release(deal(d), owner, Decimal::from(a), &usd()).await.map(|_| ()),
                    Op::Refund(d, a) => wallets.refund(deal(d), ADVERTISER, Decimal::from(a), &usd()).await.map(|_| ()),
                };
            }

            let entries = store.all_transactions().await;
            for wallet in store.all_wallets().await {
                let sum: Decimal = entries
                    .iter()
                    .filter(|e| e.wallet_id == wallet.id)
                    .map(|e| e.amount)
                    .sum();
                assert_eq!(wallet.balance, sum);
                assert!(wallet.balance >= Decimal::ZERO);
            }
            for id in &deals {
                let Ok(held) = wallets.escrow_held(*id).await else {
                    panic!("held readable");
                };
                assert!(held >= Decimal::ZERO);
            }
        });
    }
}
