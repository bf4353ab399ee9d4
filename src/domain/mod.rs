//! Domain layer: identifiers, money, wallets, deals and the state graph.
//!
//! This module contains the server-side domain model: entity identity,
//! the wallet ledger, the deal aggregate with its declared transition
//! table, the event bus for broadcasting state changes, and the per-deal
//! lock registry that serializes transitions.

pub mod deal;
pub mod deal_event;
pub mod deal_locks;
pub mod event_bus;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod transition;

pub use deal::{Deal, DealFilter, DealStatus, NewDeal};
pub use deal_event::DealEvent;
pub use deal_locks::DealLocks;
pub use event_bus::EventBus;
pub use ids::{CampaignId, ChannelId, DealId, TransactionId, UserId, WalletId};
pub use ledger::{LedgerTransaction, TransactionKind, Wallet};
pub use money::Currency;
pub use transition::{ActionKind, Actor, DealAction, LedgerEffect, Role, TransitionRule};
