//! # tg-escrow-gateway
//!
//! Deal lifecycle and escrow ledger for a Telegram sponsored-post
//! marketplace, served over REST and WebSocket.
//!
//! An advertiser proposes a paid post to a channel owner. The deal moves
//! through an explicit transition table; accepting it escrows the price
//! from the advertiser's wallet, a finished monitoring window pays it out
//! to the channel owner, and cancellations or refunds return it. Every
//! status change commits atomically with its ledger entry.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── DealService ─► WalletService (service/)
//!     ├── Transition table, EventBus, DealLocks (domain/)
//!     │
//!     ├── Dispatcher ─► Telegram or simulated gateways (dispatch/)
//!     │
//!     └── Store: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod service;
pub mod ws;
