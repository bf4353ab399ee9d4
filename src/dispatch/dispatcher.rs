//! Background job queue for notifications and publications.
//!
//! The request path only ever calls [`Dispatcher::submit`], which is a
//! non-blocking `try_send` on a bounded [`tokio::sync::mpsc`] channel.
//! [`DispatchWorker::run`] drains the queue and runs each job in its own
//! task, so a post scheduled for tomorrow never delays a notification.
//! Every outcome is published on the [`EventBus`]; publication outcomes
//! are also sent to the deal engine as [`PostOutcome`]s.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::gateway::{DispatchError, NotificationGateway, PostingGateway};
use crate::domain::{ChannelId, DealEvent, DealId, EventBus, UserId};

/// A side effect requested by a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Message a deal participant.
    Notify {
        /// Deal the message is about.
        deal_id: DealId,
        /// Recipient.
        user_id: UserId,
        /// Message text.
        text: String,
    },
    /// Publish the creative to the channel.
    Publish {
        /// Deal being published.
        deal_id: DealId,
        /// Target channel.
        channel_id: ChannelId,
        /// Text to publish.
        content: String,
        /// Publish no earlier than this instant; `None` means now.
        scheduled_time: Option<DateTime<Utc>>,
    },
}

impl Job {
    /// Returns the deal the job belongs to.
    #[must_use]
    pub const fn deal_id(&self) -> DealId {
        match self {
            Self::Notify { deal_id, .. } | Self::Publish { deal_id, .. } => *deal_id,
        }
    }

    /// Returns the job kind label used in events and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Notify { .. } => "notify",
            Self::Publish { .. } => "publish",
        }
    }
}

/// Result of a publication job, fed back into the deal engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    /// Deal that was published (or not).
    pub deal_id: DealId,
    /// Publication instant, or the last error.
    pub result: Result<DateTime<Utc>, String>,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based; the first attempt
    /// has no delay).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Submission handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<Job>,
    event_bus: EventBus,
}

impl Dispatcher {
    /// Creates a dispatcher and the receiving end for its worker.
    #[must_use]
    pub fn channel(capacity: usize, event_bus: EventBus) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, event_bus }, receiver)
    }

    /// Queues a job without waiting.
    ///
    /// Returns `false` if the queue is full or the worker is gone; the
    /// drop is logged and published as [`DealEvent::DispatchDropped`].
    pub fn submit(&self, job: Job) -> bool {
        let deal_id = job.deal_id();
        let kind = job.kind();
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "queue full",
                    TrySendError::Closed(_) => "worker stopped",
                };
                tracing::warn!(%deal_id, job = kind, reason, "dispatch job dropped");
                let _ = self.event_bus.publish(DealEvent::DispatchDropped {
                    deal_id,
                    job: kind.to_string(),
                    timestamp: Utc::now(),
                });
                false
            }
        }
    }
}

/// Executes queued jobs against the configured gateways.
#[derive(Debug, Clone)]
pub struct DispatchWorker {
    notifier: Arc<dyn NotificationGateway>,
    poster: Arc<dyn PostingGateway>,
    event_bus: EventBus,
    outcomes: mpsc::Sender<PostOutcome>,
    policy: RetryPolicy,
}

impl DispatchWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        notifier: Arc<dyn NotificationGateway>,
        poster: Arc<dyn PostingGateway>,
        event_bus: EventBus,
        outcomes: mpsc::Sender<PostOutcome>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            notifier,
            poster,
            event_bus,
            outcomes,
            policy,
        }
    }

    /// Drains `jobs` until every [`Dispatcher`] handle is dropped.
    pub async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        tracing::info!("dispatch worker started");
        while let Some(job) = jobs.recv().await {
            let worker = self.clone();
            tokio::spawn(async move { worker.execute(job).await });
        }
        tracing::info!("dispatch worker stopped");
    }

    /// Runs a single job to completion, including retries.
    pub async fn execute(&self, job: Job) {
        match job {
            Job::Notify {
                deal_id,
                user_id,
                text,
            } => self.notify(deal_id, user_id, &text).await,
            Job::Publish {
                deal_id,
                channel_id,
                content,
                scheduled_time,
            } => {
                if let Some(at) = scheduled_time
                    && let Ok(wait) = (at - Utc::now()).to_std()
                {
                    tracing::debug!(%deal_id, %at, "waiting for scheduled post time");
                    tokio::time::sleep(wait).await;
                }
                self.publish(deal_id, channel_id, &content).await;
            }
        }
    }

    async fn notify(&self, deal_id: DealId, user_id: UserId, text: &str) {
        let (result, attempts) = self
            .with_retry(|| self.notifier.notify(user_id, text))
            .await;

        let event = match result {
            Ok(()) => {
                tracing::debug!(%deal_id, %user_id, attempts, "notification delivered");
                DealEvent::NotificationDelivered {
                    deal_id,
                    user_id,
                    attempts,
                    timestamp: Utc::now(),
                }
            }
            Err(err) => {
                tracing::warn!(%deal_id, %user_id, attempts, error = %err, "notification failed");
                DealEvent::NotificationFailed {
                    deal_id,
                    user_id,
                    attempts,
                    error: err.to_string(),
                    timestamp: Utc::now(),
                }
            }
        };
        let _ = self.event_bus.publish(event);
    }

    async fn publish(&self, deal_id: DealId, channel_id: ChannelId, content: &str) {
        let (result, attempts) = self
            .with_retry(|| self.poster.publish(channel_id, content))
            .await;

        let outcome = match result {
            Ok(post) => {
                tracing::info!(%deal_id, %channel_id, attempts, message_id = ?post.message_id, "post published");
                let _ = self.event_bus.publish(DealEvent::PostPublished {
                    deal_id,
                    channel_id,
                    timestamp: post.posted_at,
                });
                Ok(post.posted_at)
            }
            Err(err) => {
                tracing::warn!(%deal_id, %channel_id, attempts, error = %err, "post failed");
                let _ = self.event_bus.publish(DealEvent::PostFailed {
                    deal_id,
                    channel_id,
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
                Err(err.to_string())
            }
        };

        if self
            .outcomes
            .send(PostOutcome {
                deal_id,
                result: outcome,
            })
            .await
            .is_err()
        {
            tracing::error!(%deal_id, "post outcome receiver closed");
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> (Result<T, DispatchError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_retryable() && attempt < max => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying dispatch");
                    tokio::time::sleep(self.policy.delay_before(attempt)).await;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}
