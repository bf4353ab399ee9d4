//! Declared deal state graph.
//!
//! [`TRANSITION_TABLE`] lists every legal `(status, role, action)` triple
//! together with the resulting status and the ledger effect that must land
//! atomically with it. Anything not listed is illegal: [`lookup`] fails
//! closed and the engine reports an invalid transition.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{DealStatus, UserId};

/// Role an actor plays in a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The paying advertiser.
    Advertiser,
    /// The owner of the target channel.
    ChannelOwner,
    /// Scheduler callbacks, the monitoring sweeper and administrators.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Advertiser => "advertiser",
            Self::ChannelOwner => "channel_owner",
            Self::System => "system",
        })
    }
}

/// Who is requesting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// An advertiser acting as themselves.
    Advertiser(UserId),
    /// A channel owner acting as themselves.
    ChannelOwner(UserId),
    /// The service itself.
    System,
}

impl Actor {
    /// Returns the role the actor claims.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Advertiser(_) => Role::Advertiser,
            Self::ChannelOwner(_) => Role::ChannelOwner,
            Self::System => Role::System,
        }
    }

    /// Returns the acting user, if any.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::Advertiser(id) | Self::ChannelOwner(id) => Some(id),
            Self::System => None,
        }
    }
}

/// Fieldless discriminant of a [`DealAction`], used as the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send a draft deal to the channel owner.
    Submit,
    /// Withdraw the deal before it is funded.
    Cancel,
    /// Accept the deal or the creative.
    Accept,
    /// Reject the deal or the creative.
    Reject,
    /// Start preparing the creative.
    StartDraft,
    /// Submit creative text for review.
    SubmitDraft,
    /// Ask for creative changes.
    RequestChanges,
    /// Propose a publication time.
    ProposePostTime,
    /// Agree to the counter-party's proposed time.
    AgreePostTime,
    /// Posting gateway reported success.
    PostSucceeded,
    /// Posting gateway reported failure.
    PostFailed,
    /// Request publication again after a failure.
    RetryPost,
    /// Give up on publication and refund.
    RequestRefund,
    /// Start watching a live post.
    StartMonitoring,
    /// Monitoring window is over.
    MonitoringElapsed,
    /// Contest the publication.
    OpenDispute,
    /// Settle a dispute in the channel owner's favour.
    ResolveForOwner,
    /// Settle a dispute in the advertiser's favour.
    ResolveForAdvertiser,
    /// Confirm that a pending refund was paid.
    ConfirmRefund,
}

impl ActionKind {
    /// Returns the snake-case action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Cancel => "cancel",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::StartDraft => "start_draft",
            Self::SubmitDraft => "submit_draft",
            Self::RequestChanges => "request_changes",
            Self::ProposePostTime => "propose_post_time",
            Self::AgreePostTime => "agree_post_time",
            Self::PostSucceeded => "post_succeeded",
            Self::PostFailed => "post_failed",
            Self::RetryPost => "retry_post",
            Self::RequestRefund => "request_refund",
            Self::StartMonitoring => "start_monitoring",
            Self::MonitoringElapsed => "monitoring_elapsed",
            Self::OpenDispute => "open_dispute",
            Self::ResolveForOwner => "resolve_for_owner",
            Self::ResolveForAdvertiser => "resolve_for_advertiser",
            Self::ConfirmRefund => "confirm_refund",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested deal action with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealAction {
    /// Send a draft deal to the channel owner.
    Submit,
    /// Withdraw the deal before it is funded.
    Cancel,
    /// Accept the deal (channel owner) or the creative (advertiser).
    Accept,
    /// Reject the deal or the creative.
    Reject {
        /// Optional explanation stored on the deal.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Start preparing the creative.
    StartDraft,
    /// Submit creative text for review.
    SubmitDraft {
        /// Post text.
        text: String,
    },
    /// Ask for creative changes.
    RequestChanges {
        /// What should change.
        reason: String,
    },
    /// Propose a publication time.
    ProposePostTime {
        /// Proposed publication instant.
        at: DateTime<Utc>,
    },
    /// Agree to the counter-party's proposed time.
    AgreePostTime,
    /// Posting gateway reported success.
    PostSucceeded {
        /// When the post went live; defaults to now.
        #[serde(default)]
        posted_at: Option<DateTime<Utc>>,
    },
    /// Posting gateway reported failure.
    PostFailed {
        /// Gateway error message.
        error: String,
    },
    /// Request publication again after a failure.
    RetryPost,
    /// Give up on publication and refund.
    RequestRefund,
    /// Start watching a live post.
    StartMonitoring,
    /// Monitoring window is over; release funds.
    MonitoringElapsed,
    /// Contest the publication.
    OpenDispute {
        /// Why the advertiser disputes the post.
        reason: String,
    },
    /// Settle a dispute in the channel owner's favour.
    ResolveForOwner,
    /// Settle a dispute in the advertiser's favour.
    ResolveForAdvertiser,
    /// Confirm that a pending refund was paid.
    ConfirmRefund,
}

impl DealAction {
    /// Returns the table key for this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Submit => ActionKind::Submit,
            Self::Cancel => ActionKind::Cancel,
            Self::Accept => ActionKind::Accept,
            Self::Reject { .. } => ActionKind::Reject,
            Self::StartDraft => ActionKind::StartDraft,
            Self::SubmitDraft { .. } => ActionKind::SubmitDraft,
            Self::RequestChanges { .. } => ActionKind::RequestChanges,
            Self::ProposePostTime { .. } => ActionKind::ProposePostTime,
            Self::AgreePostTime => ActionKind::AgreePostTime,
            Self::PostSucceeded { .. } => ActionKind::PostSucceeded,
            Self::PostFailed { .. } => ActionKind::PostFailed,
            Self::RetryPost => ActionKind::RetryPost,
            Self::RequestRefund => ActionKind::RequestRefund,
            Self::StartMonitoring => ActionKind::StartMonitoring,
            Self::MonitoringElapsed => ActionKind::MonitoringElapsed,
            Self::OpenDispute { .. } => ActionKind::OpenDispute,
            Self::ResolveForOwner => ActionKind::ResolveForOwner,
            Self::ResolveForAdvertiser => ActionKind::ResolveForAdvertiser,
            Self::ConfirmRefund => ActionKind::ConfirmRefund,
        }
    }
}

/// Money movement that must land in the same commit as a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEffect {
    /// Status-only change.
    None,
    /// Debit the advertiser by the price and hold it.
    Escrow,
    /// Pay the held price out to the channel owner.
    Release,
    /// Return the held price to the advertiser.
    Refund,
}

/// One row of the state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TransitionRule {
    /// Status the deal must be in.
    pub from: DealStatus,
    /// Role allowed to request the action.
    pub role: Role,
    /// Requested action.
    pub action: ActionKind,
    /// Resulting status.
    pub to: DealStatus,
    /// Ledger movement committed with the status change.
    pub ledger: LedgerEffect,
    /// Whether publication is requested after the commit.
    pub publish: bool,
}

const fn rule(
    from: DealStatus,
    role: Role,
    action: ActionKind,
    to: DealStatus,
    ledger: LedgerEffect,
    publish: bool,
) -> TransitionRule {
    TransitionRule {
        from,
        role,
        action,
        to,
        ledger,
        publish,
    }
}

use ActionKind as A;
use DealStatus as S;
use LedgerEffect as L;
use Role as R;

/// Every legal transition.
pub const TRANSITION_TABLE: &[TransitionRule] = &[
    rule(S::Draft, R::Advertiser, A::Submit, S::Submitted, L::None, false),
    rule(S::Draft, R::Advertiser, A::Cancel, S::Cancelled, L::None, false),
    rule(S::Submitted, R::ChannelOwner, A::Accept, S::Funded, L::Escrow, false),
    rule(S::Submitted, R::ChannelOwner, A::Reject, S::Cancelled, L::None, false),
    rule(S::Submitted, R::Advertiser, A::Cancel, S::Cancelled, L::None, false),
    // creative approval
    rule(S::Funded, R::Advertiser, A::Accept, S::Approved, L::None, true),
    rule(S::Funded, R::Advertiser, A::Reject, S::Cancelled, L::Refund, false),
    rule(S::Funded, R::ChannelOwner, A::StartDraft, S::DraftPending, L::None, false),
    rule(S::Funded, R::ChannelOwner, A::SubmitDraft, S::DraftSubmitted, L::None, false),
    rule(S::Funded, R::ChannelOwner, A::Reject, S::Rejected, L::Refund, false),
    rule(S::DraftPending, R::ChannelOwner, A::SubmitDraft, S::DraftSubmitted, L::None, false),
    rule(S::DraftPending, R::ChannelOwner, A::Reject, S::Rejected, L::Refund, false),
    rule(S::ChangesRequested, R::ChannelOwner, A::SubmitDraft, S::DraftSubmitted, L::None, false),
    rule(S::ChangesRequested, R::ChannelOwner, A::Reject, S::Rejected, L::Refund, false),
    rule(S::DraftSubmitted, R::Advertiser, A::Accept, S::Approved, L::None, true),
    rule(S::DraftSubmitted, R::Advertiser, A::RequestChanges, S::ChangesRequested, L::None, false),
    rule(S::DraftSubmitted, R::Advertiser, A::Reject, S::Cancelled, L::Refund, false),
    // publication time negotiation
    rule(S::Funded, R::Advertiser, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::Funded, R::ChannelOwner, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::DraftSubmitted, R::Advertiser, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::DraftSubmitted, R::ChannelOwner, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::Scheduling, R::Advertiser, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::Scheduling, R::ChannelOwner, A::ProposePostTime, S::Scheduling, L::None, false),
    rule(S::Scheduling, R::Advertiser, A::AgreePostTime, S::Scheduled, L::None, true),
    rule(S::Scheduling, R::ChannelOwner, A::AgreePostTime, S::Scheduled, L::None, true),
    rule(S::Scheduling, R::Advertiser, A::Reject, S::Cancelled, L::Refund, false),
    rule(S::Scheduling, R::ChannelOwner, A::Reject, S::Rejected, L::Refund, false),
    // publication outcome
    rule(S::Approved, R::System, A::PostSucceeded, S::Posted, L::None, false),
    rule(S::Approved, R::System, A::PostFailed, S::FailedToPost, L::None, false),
    rule(S::Scheduled, R::System, A::PostSucceeded, S::Posted, L::None, false),
    rule(S::Scheduled, R::System, A::PostFailed, S::FailedToPost, L::None, false),
    rule(S::FailedToPost, R::System, A::RetryPost, S::Approved, L::None, true),
    rule(S::FailedToPost, R::System, A::RequestRefund, S::PendingRefund, L::None, false),
    // monitoring and payout
    rule(S::Posted, R::System, A::StartMonitoring, S::Monitoring, L::None, false),
    rule(S::Monitoring, R::System, A::MonitoringElapsed, S::Released, L::Release, false),
    rule(S::Posted, R::Advertiser, A::OpenDispute, S::Disputed, L::None, false),
    rule(S::Monitoring, R::Advertiser, A::OpenDispute, S::Disputed, L::None, false),
    rule(S::Disputed, R::System, A::ResolveForOwner, S::Released, L::Release, false),
    rule(S::Disputed, R::System, A::ResolveForAdvertiser, S::PendingRefund, L::None, false),
    rule(S::PendingRefund, R::System, A::ConfirmRefund, S::Refunded, L::Refund, false),
];

/// Finds the rule for a `(status, role, action)` triple.
///
/// Returns `None` for every combination the table does not list.
#[must_use]
pub fn lookup(from: DealStatus, role: Role, action: ActionKind) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE
        .iter()
        .find(|r| r.from == from && r.role == role && r.action == action)
}
