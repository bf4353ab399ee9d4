//! Service assembly: builds the object graph from configuration and
//! spawns the background tasks.
//!
//! ```text
//! DealService ──Job──► Dispatcher queue ──► DispatchWorker ──► gateways
//!      ▲                                          │
//!      └──────────── PostOutcome ◄────────────────┘
//! DealService::run_monitoring_sweeper (interval)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app_state::AppState;
use crate::config::ServiceConfig;
use crate::dispatch::{
    BotClient, DispatchError, DispatchWorker, Dispatcher, NotificationGateway, PostingGateway,
    RecordingNotifier, RetryPolicy, SimulatedPoster, TelegramNotifier, TelegramPoster,
};
use crate::domain::{DealLocks, EventBus};
use crate::persistence::Store;
use crate::service::{DealService, WalletService};

/// Outbound collaborators used by the dispatcher.
#[derive(Debug, Clone)]
pub struct Gateways {
    /// Direct-message sender.
    pub notifier: Arc<dyn NotificationGateway>,
    /// Channel publisher.
    pub poster: Arc<dyn PostingGateway>,
}

impl Gateways {
    /// Telegram Bot API gateways when a token is configured, simulated
    /// ones otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Setup`] if the Bot API client cannot be
    /// built.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DispatchError> {
        match config.telegram_bot_token.as_deref() {
            Some(token) => {
                let client = Arc::new(BotClient::new(&config.telegram_api_base, token)?);
                tracing::info!(api = %config.telegram_api_base, "using Telegram Bot API gateways");
                Ok(Self {
                    notifier: Arc::new(TelegramNotifier::new(Arc::clone(&client))),
                    poster: Arc::new(TelegramPoster::new(client)),
                })
            }
            None => {
                tracing::info!("no bot token configured; using simulated gateways");
                Ok(Self::simulated(RecordingNotifier::new(), SimulatedPoster::new()))
            }
        }
    }

    /// Wraps the deterministic fakes. Callers keep their own clones to
    /// inspect what was sent.
    #[must_use]
    pub fn simulated(notifier: RecordingNotifier, poster: SimulatedPoster) -> Self {
        Self {
            notifier: Arc::new(notifier),
            poster: Arc::new(poster),
        }
    }
}

/// A running service: shared state plus its background tasks.
#[derive(Debug)]
pub struct Runtime {
    /// State handed to the router.
    pub state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Builds the services and spawns the dispatch worker, the post
    /// outcome consumer and the monitoring sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(config: &ServiceConfig, store: Arc<dyn Store>, gateways: Gateways) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let (dispatcher, jobs) = Dispatcher::channel(config.dispatch_queue_capacity, event_bus.clone());
        let (outcome_tx, outcome_rx) = mpsc::channel(config.dispatch_queue_capacity.max(1));

        let worker = DispatchWorker::new(
            gateways.notifier,
            gateways.poster,
            event_bus.clone(),
            outcome_tx,
            RetryPolicy {
                max_attempts: config.dispatch_max_attempts.max(1),
                base_delay: config.dispatch_retry_base,
            },
        );

        let wallet_service = WalletService::new(Arc::clone(&store), config.wallet_starting_balance);
        let deal_service = DealService::new(
            store,
            wallet_service.clone(),
            Arc::new(DealLocks::new(config.deal_lock_timeout)),
            event_bus.clone(),
            dispatcher,
            config.monitoring_window,
        );

        let tasks = vec![
            tokio::spawn(worker.run(jobs)),
            tokio::spawn(deal_service.clone().run_post_outcomes(outcome_rx)),
            tokio::spawn(
                deal_service
                    .clone()
                    .run_monitoring_sweeper(config.monitoring_sweep_interval),
            ),
        ];

        Self {
            state: AppState {
                deal_service: Arc::new(deal_service),
                wallet_service,
                event_bus,
            },
            tasks,
        }
    }

    /// Aborts the background tasks.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        tracing::info!("background tasks stopped");
    }
}
