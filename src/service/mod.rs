//! Service layer: business logic orchestration.
//!
//! [`WalletService`] owns balances and the ledger. [`DealService`] runs
//! the deal state machine, commits each transition with its ledger effect
//! and emits events through the [`super::domain::EventBus`].

pub mod deal_service;
pub mod wallet_service;

pub use deal_service::{DealService, SweepSummary};
pub use wallet_service::WalletService;
