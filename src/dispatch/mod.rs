//! Side effects that run after a transition commits.
//!
//! Notifications and channel posts go through the [`NotificationGateway`]
//! and [`PostingGateway`] capabilities. Real Telegram implementations and
//! deterministic fakes exist for both; configuration picks one. Failures
//! here never roll back a deal transition.

pub mod dispatcher;
pub mod fake;
pub mod gateway;
pub mod telegram;

pub use dispatcher::{DispatchWorker, Dispatcher, Job, PostOutcome, RetryPolicy};
pub use fake::{RecordingNotifier, SimulatedPoster};
pub use gateway::{DispatchError, NotificationGateway, PostingGateway, PublishedPost};
pub use telegram::{BotClient, TelegramNotifier, TelegramPoster};
