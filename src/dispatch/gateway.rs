//! Outbound capabilities: user notifications and channel posts.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ChannelId, UserId};

/// Failure of an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Network failure, timeout, rate limit or 5xx. Worth retrying.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform refused the request (bad chat, bot blocked, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The gateway could not be constructed (TLS backend, proxy config).
    #[error("gateway setup failed: {0}")]
    Setup(String),
}

impl DispatchError {
    /// Returns `true` if a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A post the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPost {
    /// Platform message ID, when the platform returns one.
    pub message_id: Option<i64>,
    /// When the post went live.
    pub posted_at: DateTime<Utc>,
}

/// Sends direct messages to users.
#[async_trait]
pub trait NotificationGateway: Send + Sync + fmt::Debug {
    /// Delivers `text` to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if the message was not delivered.
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), DispatchError>;
}

/// Publishes creatives to channels.
#[async_trait]
pub trait PostingGateway: Send + Sync + fmt::Debug {
    /// Publishes `content` to `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if the post was not published.
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<PublishedPost, DispatchError>;
}
