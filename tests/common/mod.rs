//! Shared harness for the integration tests: an in-memory service with
//! simulated gateways and fast timers.

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use tg_escrow_gateway::app_state::AppState;
use tg_escrow_gateway::config::ServiceConfig;
use tg_escrow_gateway::dispatch::{RecordingNotifier, SimulatedPoster};
use tg_escrow_gateway::domain::{ChannelId, Currency, DealEvent, NewDeal, UserId};
use tg_escrow_gateway::persistence::{MemoryStore, Store};
use tg_escrow_gateway::runtime::{Gateways, Runtime};

/// Advertiser used throughout the tests.
pub const ADVERTISER: UserId = UserId(1001);
/// Channel owner used throughout the tests.
pub const OWNER: UserId = UserId(2002);
/// Channel used throughout the tests.
pub const CHANNEL: ChannelId = ChannelId(-100_123);

/// A running in-memory service.
pub struct TestApp {
    /// Running services.
    pub runtime: Runtime,
    /// Backing store.
    pub store: Arc<MemoryStore>,
    /// Records every notification.
    pub notifier: RecordingNotifier,
    /// Records every publication.
    pub poster: SimulatedPoster,
}

impl TestApp {
    /// Shared state for handlers.
    pub fn state(&self) -> &AppState {
        &self.runtime.state
    }
}

/// Config with fast retries and no background sweeping.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        dispatch_retry_base: Duration::from_millis(5),
        monitoring_window: Duration::from_secs(60),
        monitoring_sweep_interval: Duration::from_secs(3600),
        ..ServiceConfig::default()
    }
}

/// Starts a service with [`test_config`].
pub fn spawn_app() -> TestApp {
    spawn_app_with(&test_config())
}

/// Starts a service with the given config.
pub fn spawn_app_with(config: &ServiceConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let poster = SimulatedPoster::new();
    let runtime = Runtime::start(
        config,
        Arc::clone(&store) as Arc<dyn Store>,
        Gateways::simulated(notifier.clone(), poster.clone()),
    );
    TestApp {
        runtime,
        store,
        notifier,
        poster,
    }
}

/// The `USD` currency.
pub fn usd() -> Currency {
    let Ok(currency) = Currency::new("USD") else {
        panic!("USD is a valid code");
    };
    currency
}

/// A submitted deal between [`ADVERTISER`] and [`OWNER`].
pub fn new_deal(price: Decimal) -> NewDeal {
    NewDeal {
        advertiser_id: ADVERTISER,
        channel_id: CHANNEL,
        channel_owner_id: OWNER,
        campaign_id: None,
        price_amount: price,
        price_currency: usd(),
        brief: "Promote our weekly newsletter".to_string(),
        as_draft: false,
    }
}

/// Waits up to two seconds for an event matching `pred`.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<DealEvent>,
    pred: impl Fn(&DealEvent) -> bool,
) -> DealEvent {
    let found = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;
    match found {
        Ok(Some(event)) => event,
        _ => panic!("expected event did not arrive"),
    }
}
