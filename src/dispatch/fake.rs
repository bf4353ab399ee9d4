//! Deterministic in-process gateways.
//!
//! Used when no bot token is configured and throughout the tests. A
//! successful simulated post is indistinguishable from a real one to the
//! deal engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::gateway::{DispatchError, NotificationGateway, PostingGateway, PublishedPost};
use crate::domain::{ChannelId, UserId};

/// Notifier that records every delivered message.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(UserId, String)>>>,
    failing: Arc<AtomicBool>,
    transient_failures: Arc<AtomicU32>,
}

impl RecordingNotifier {
    /// Creates a notifier that always delivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delivery fail permanently (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `n` deliveries fail with a retryable error.
    pub fn fail_transiently(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Returns the delivered messages in order.
    pub async fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().await.clone()
    }

    /// Returns the messages delivered to `user_id`.
    pub async fn sent_to(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected(format!(
                "recipient {user_id} unreachable"
            )));
        }
        if take_one(&self.transient_failures) {
            return Err(DispatchError::Transport("simulated timeout".to_string()));
        }
        self.sent.lock().await.push((user_id, text.to_string()));
        Ok(())
    }
}

/// Poster that pretends to publish and remembers what it published.
#[derive(Debug, Default, Clone)]
pub struct SimulatedPoster {
    published: Arc<Mutex<Vec<(ChannelId, String)>>>,
    failing: Arc<AtomicBool>,
    transient_failures: Arc<AtomicU32>,
    next_message_id: Arc<AtomicI64>,
}

impl SimulatedPoster {
    /// Creates a poster that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publication fail permanently (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `n` publications fail with a retryable error.
    pub fn fail_transiently(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Returns the published posts in order.
    pub async fn published(&self) -> Vec<(ChannelId, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl PostingGateway for SimulatedPoster {
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<PublishedPost, DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected(format!(
                "bot is not an admin of {channel_id}"
            )));
        }
        if take_one(&self.transient_failures) {
            return Err(DispatchError::Transport("simulated timeout".to_string()));
        }
        self.published
            .lock()
            .await
            .push((channel_id, content.to_string()));
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PublishedPost {
            message_id: Some(message_id),
            posted_at: Utc::now(),
        })
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifier_records_and_fails_on_demand() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.notify(UserId(7), "hello").await.is_ok());
        assert_eq!(notifier.sent_to(UserId(7)).await, vec!["hello".to_string()]);

        notifier.fail_transiently(1);
        assert!(matches!(
            notifier.notify(UserId(7), "again").await,
            Err(DispatchError::Transport(_))
        ));
        assert!(notifier.notify(UserId(7), "again").await.is_ok());

        notifier.set_failing(true);
        assert!(matches!(
            notifier.notify(UserId(7), "blocked").await,
            Err(DispatchError::Rejected(_))
        ));
        assert_eq!(notifier.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn poster_assigns_increasing_message_ids() {
        let poster = SimulatedPoster::new();
        let first = poster.publish(ChannelId(-1), "a").await;
        let second = poster.publish(ChannelId(-1), "b").await;
        assert!(matches!(first, Ok(p) if p.message_id == Some(1)));
        assert!(matches!(second, Ok(p) if p.message_id == Some(2)));
        assert_eq!(poster.published().await.len(), 2);
    }
}
