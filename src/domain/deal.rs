//! Deal aggregate and its lifecycle status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CampaignId, ChannelId, Currency, DealId, UserId};
use crate::error::ServiceError;

/// Lifecycle status of a deal.
///
/// Legal moves between statuses are declared in
/// [`super::transition::TRANSITION_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Created but not yet sent to the channel owner.
    Draft,
    /// Awaiting the channel owner's decision.
    Submitted,
    /// Accepted by the channel owner; price held in escrow.
    Funded,
    /// Creative approved by the advertiser; publication requested.
    Approved,
    /// Channel owner is preparing the creative.
    DraftPending,
    /// Creative submitted for the advertiser's review.
    DraftSubmitted,
    /// Advertiser asked for changes to the creative.
    ChangesRequested,
    /// Publication time under negotiation.
    Scheduling,
    /// Publication time agreed; publication requested for that time.
    Scheduled,
    /// Post is live in the channel.
    Posted,
    /// Post is live and inside the monitoring window.
    Monitoring,
    /// Escrow paid out to the channel owner.
    Released,
    /// Abandoned before publication.
    Cancelled,
    /// Channel owner backed out after funding.
    Rejected,
    /// Publication failed; needs a retry or a refund.
    FailedToPost,
    /// Advertiser contests the publication.
    Disputed,
    /// Escrow returned to the advertiser.
    Refunded,
    /// Refund decided, awaiting confirmation.
    PendingRefund,
}

impl DealStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 18] = [
        Self::Draft,
        Self::Submitted,
        Self::Funded,
        Self::Approved,
        Self::DraftPending,
        Self::DraftSubmitted,
        Self::ChangesRequested,
        Self::Scheduling,
        Self::Scheduled,
        Self::Posted,
        Self::Monitoring,
        Self::Released,
        Self::Cancelled,
        Self::Rejected,
        Self::FailedToPost,
        Self::Disputed,
        Self::Refunded,
        Self::PendingRefund,
    ];

    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Funded => "funded",
            Self::Approved => "approved",
            Self::DraftPending => "draft_pending",
            Self::DraftSubmitted => "draft_submitted",
            Self::ChangesRequested => "changes_requested",
            Self::Scheduling => "scheduling",
            Self::Scheduled => "scheduled",
            Self::Posted => "posted",
            Self::Monitoring => "monitoring",
            Self::Released => "released",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::FailedToPost => "failed_to_post",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
            Self::PendingRefund => "pending_refund",
        }
    }

    /// Returns `true` if no further transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Released | Self::Cancelled | Self::Rejected | Self::Refunded
        )
    }

    /// Returns `true` while the deal's price is held in escrow.
    #[must_use]
    pub const fn holds_escrow(self) -> bool {
        !matches!(
            self,
            Self::Draft
                | Self::Submitted
                | Self::Released
                | Self::Cancelled
                | Self::Rejected
                | Self::Refunded
        )
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ServiceError::InvalidRequest(format!("unknown deal status: {s}")))
    }
}

/// Single advertiser ↔ channel engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// Deal identifier.
    pub id: DealId,
    /// Advertiser paying for the post.
    pub advertiser_id: UserId,
    /// Channel the post is published to.
    pub channel_id: ChannelId,
    /// Owner of the channel; payee on release.
    pub channel_owner_id: UserId,
    /// Campaign the deal was spawned from, if any.
    pub campaign_id: Option<CampaignId>,
    /// Agreed price.
    pub price_amount: Decimal,
    /// Currency of the price.
    pub price_currency: Currency,
    /// Advertiser's brief.
    pub brief: String,
    /// Creative text submitted by the channel owner, if any.
    pub creative: Option<String>,
    /// Current lifecycle status.
    pub status: DealStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last status change.
    pub updated_at: DateTime<Utc>,
    /// When the escrow debit landed.
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    /// When funds were released to the channel owner.
    pub payout_at: Option<DateTime<Utc>>,
    /// When funds were returned to the advertiser.
    pub refund_at: Option<DateTime<Utc>>,
    /// When the post went live.
    pub actual_post_time: Option<DateTime<Utc>>,
    /// Reason given on rejection, change request or dispute.
    pub rejection_reason: Option<String>,
    /// Publication time currently proposed.
    pub proposed_post_time: Option<DateTime<Utc>>,
    /// Who proposed `proposed_post_time`.
    pub proposed_by: Option<UserId>,
    /// Publication time both parties agreed on.
    pub agreed_post_time: Option<DateTime<Utc>>,
    /// Last publication error reported by the posting gateway.
    pub post_error: Option<String>,
}

impl Deal {
    /// Builds a new deal from creation input in the given initial status.
    #[must_use]
    pub fn from_new(new: NewDeal, status: DealStatus) -> Self {
        let now = Utc::now();
        Self {
            id: DealId::new(),
            advertiser_id: new.advertiser_id,
            channel_id: new.channel_id,
            channel_owner_id: new.channel_owner_id,
            campaign_id: new.campaign_id,
            price_amount: new.price_amount,
            price_currency: new.price_currency,
            brief: new.brief,
            creative: None,
            status,
            created_at: now,
            updated_at: now,
            payment_confirmed_at: None,
            payout_at: None,
            refund_at: None,
            actual_post_time: None,
            rejection_reason: None,
            proposed_post_time: None,
            proposed_by: None,
            agreed_post_time: None,
            post_error: None,
        }
    }

    /// Text to publish: the submitted creative, falling back to the brief.
    #[must_use]
    pub fn content(&self) -> &str {
        self.creative.as_deref().unwrap_or(&self.brief)
    }

    /// Returns the other participant of the deal.
    #[must_use]
    pub fn counterparty_of(&self, user_id: UserId) -> UserId {
        if user_id == self.advertiser_id {
            self.channel_owner_id
        } else {
            self.advertiser_id
        }
    }
}

/// Validated input for creating a deal.
#[derive(Debug, Clone)]
pub struct NewDeal {
    /// Advertiser paying for the post.
    pub advertiser_id: UserId,
    /// Target channel.
    pub channel_id: ChannelId,
    /// Owner of the target channel.
    pub channel_owner_id: UserId,
    /// Originating campaign.
    pub campaign_id: Option<CampaignId>,
    /// Price, strictly positive.
    pub price_amount: Decimal,
    /// Price currency.
    pub price_currency: Currency,
    /// Advertiser's brief.
    pub brief: String,
    /// Start in `draft` instead of `submitted`.
    pub as_draft: bool,
}

/// Criteria for listing deals. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    /// Only deals paid by this advertiser.
    pub advertiser_id: Option<UserId>,
    /// Only deals for this channel.
    pub channel_id: Option<ChannelId>,
    /// Only deals in this status.
    pub status: Option<DealStatus>,
}

impl DealFilter {
    /// Returns `true` if the deal satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, deal: &Deal) -> bool {
        self.advertiser_id.is_none_or(|id| deal.advertiser_id == id)
            && self.channel_id.is_none_or(|id| deal.channel_id == id)
            && self.status.is_none_or(|status| deal.status == status)
    }
}
