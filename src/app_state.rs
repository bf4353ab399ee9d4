//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::{DealService, WalletService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Deal lifecycle engine.
    pub deal_service: Arc<DealService>,
    /// Wallet and ledger operations.
    pub wallet_service: WalletService,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}
