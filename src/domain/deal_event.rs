//! Domain events reflecting deal transitions and dispatch outcomes.
//!
//! Every committed transition emits a [`DealEvent`] through the
//! [`super::EventBus`], and so does every notification or publication
//! attempt the dispatcher finishes. Side effects are therefore observable
//! rather than silently dropped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{ChannelId, DealId, DealStatus, Role, UserId};

/// Domain event emitted after a state change or side-effect outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DealEvent {
    /// Emitted when a deal is created.
    DealCreated {
        /// Deal identifier.
        deal_id: DealId,
        /// Initial status.
        status: DealStatus,
        /// Price amount.
        price_amount: Decimal,
        /// Price currency code.
        price_currency: String,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a transition commits.
    StatusChanged {
        /// Deal identifier.
        deal_id: DealId,
        /// Previous status.
        from: DealStatus,
        /// New status.
        to: DealStatus,
        /// Role that requested the transition.
        actor: Role,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a notification reached the messaging platform.
    NotificationDelivered {
        /// Deal the notification was about.
        deal_id: DealId,
        /// Recipient.
        user_id: UserId,
        /// Attempts it took.
        attempts: u32,
        /// Delivery timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a notification was given up on.
    NotificationFailed {
        /// Deal the notification was about.
        deal_id: DealId,
        /// Intended recipient.
        user_id: UserId,
        /// Attempts made.
        attempts: u32,
        /// Last error.
        error: String,
        /// Timestamp of the last attempt.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the posting gateway published the creative.
    PostPublished {
        /// Deal identifier.
        deal_id: DealId,
        /// Channel published to.
        channel_id: ChannelId,
        /// Publication timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when publication was given up on.
    PostFailed {
        /// Deal identifier.
        deal_id: DealId,
        /// Target channel.
        channel_id: ChannelId,
        /// Last error.
        error: String,
        /// Timestamp of the last attempt.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a side-effect job could not be queued.
    DispatchDropped {
        /// Deal the job belonged to.
        deal_id: DealId,
        /// Job kind (`"notify"` or `"publish"`).
        job: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl DealEvent {
    /// Returns the deal ID associated with this event.
    #[must_use]
    pub fn deal_id(&self) -> DealId {
        match self {
            Self::DealCreated { deal_id, .. }
            | Self::StatusChanged { deal_id, .. }
            | Self::NotificationDelivered { deal_id, .. }
            | Self::NotificationFailed { deal_id, .. }
            | Self::PostPublished { deal_id, .. }
            | Self::PostFailed { deal_id, .. }
            | Self::DispatchDropped { deal_id, .. } => *deal_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DealCreated { .. } => "deal_created",
            Self::StatusChanged { .. } => "status_changed",
            Self::NotificationDelivered { .. } => "notification_delivered",
            Self::NotificationFailed { .. } => "notification_failed",
            Self::PostPublished { .. } => "post_published",
            Self::PostFailed { .. } => "post_failed",
            Self::DispatchDropped { .. } => "dispatch_dropped",
        }
    }
}
