//! Deal DTOs for create, get, list, approval and action endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common_dto::{
    PaginationMeta, default_page, default_per_page, parse_amount, parse_currency,
};
use crate::domain::{
    Actor, CampaignId, ChannelId, Deal, DealAction, DealFilter, DealStatus, NewDeal, Role, UserId,
};
use crate::error::ServiceError;

/// Request body for `POST /deals`.
///
/// Required fields are optional here so that a missing field is reported
/// with the service's own error body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDealRequest {
    /// Advertiser's Telegram user ID.
    pub advertiser_id: Option<i64>,
    /// Target channel's Telegram chat ID.
    pub channel_id: Option<i64>,
    /// Channel owner's Telegram user ID.
    pub channel_owner_id: Option<i64>,
    /// Originating campaign.
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    /// Price as a decimal string (e.g. `"500.00"`).
    pub price_amount: Option<String>,
    /// Price currency code (e.g. `"USD"`, `"TON"`).
    pub price_currency: Option<String>,
    /// Advertiser's brief.
    #[serde(default)]
    pub brief: String,
    /// Create in `draft` instead of `submitted`.
    #[serde(default)]
    pub as_draft: bool,
}

impl CreateDealRequest {
    /// Validates the request into domain input.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if a required field is
    /// missing or malformed.
    pub fn into_new_deal(self) -> Result<NewDeal, ServiceError> {
        let required = |v: Option<i64>, field: &str| {
            v.ok_or_else(|| ServiceError::InvalidRequest(format!("missing {field}")))
        };
        Ok(NewDeal {
            advertiser_id: UserId(required(self.advertiser_id, "advertiser_id")?),
            channel_id: ChannelId(required(self.channel_id, "channel_id")?),
            channel_owner_id: UserId(required(self.channel_owner_id, "channel_owner_id")?),
            campaign_id: self.campaign_id.map(CampaignId::from_uuid),
            price_amount: parse_amount(self.price_amount.as_deref(), "price_amount")?,
            price_currency: parse_currency(self.price_currency.as_deref())?,
            brief: self.brief,
            as_draft: self.as_draft,
        })
    }
}

/// Deal representation returned by every deal endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealDto {
    /// Deal identifier.
    pub deal_id: Uuid,
    /// Advertiser's Telegram user ID.
    pub advertiser_id: i64,
    /// Channel chat ID.
    pub channel_id: i64,
    /// Channel owner's Telegram user ID.
    pub channel_owner_id: i64,
    /// Originating campaign.
    pub campaign_id: Option<Uuid>,
    /// Price as a decimal string.
    pub price_amount: String,
    /// Price currency.
    pub price_currency: String,
    /// Brief.
    pub brief: String,
    /// Submitted creative.
    pub creative: Option<String>,
    /// Lifecycle status.
    pub status: DealStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the price was escrowed.
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    /// When funds were released.
    pub payout_at: Option<DateTime<Utc>>,
    /// When funds were refunded.
    pub refund_at: Option<DateTime<Utc>>,
    /// When the post went live.
    pub actual_post_time: Option<DateTime<Utc>>,
    /// Rejection, change or dispute reason.
    pub rejection_reason: Option<String>,
    /// Proposed publication time.
    pub proposed_post_time: Option<DateTime<Utc>>,
    /// Proposer of that time.
    pub proposed_by: Option<i64>,
    /// Agreed publication time.
    pub agreed_post_time: Option<DateTime<Utc>>,
    /// Last publication error.
    pub post_error: Option<String>,
}

impl From<Deal> for DealDto {
    fn from(deal: Deal) -> Self {
        Self {
            deal_id: deal.id.into(),
            advertiser_id: deal.advertiser_id.get(),
            channel_id: deal.channel_id.get(),
            channel_owner_id: deal.channel_owner_id.get(),
            campaign_id: deal.campaign_id.map(Uuid::from),
            price_amount: deal.price_amount.to_string(),
            price_currency: deal.price_currency.into(),
            brief: deal.brief,
            creative: deal.creative,
            status: deal.status,
            created_at: deal.created_at,
            updated_at: deal.updated_at,
            payment_confirmed_at: deal.payment_confirmed_at,
            payout_at: deal.payout_at,
            refund_at: deal.refund_at,
            actual_post_time: deal.actual_post_time,
            rejection_reason: deal.rejection_reason,
            proposed_post_time: deal.proposed_post_time,
            proposed_by: deal.proposed_by.map(UserId::get),
            agreed_post_time: deal.agreed_post_time,
            post_error: deal.post_error,
        }
    }
}

/// Query parameters for `GET /deals`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DealListQuery {
    /// Only deals of this advertiser.
    pub advertiser_id: Option<i64>,
    /// Only deals for this channel.
    pub channel_id: Option<i64>,
    /// Only deals in this status (snake case).
    pub status: Option<String>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl DealListQuery {
    /// Builds the storage filter.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] on an unknown status.
    pub fn filter(&self) -> Result<DealFilter, ServiceError> {
        Ok(DealFilter {
            advertiser_id: self.advertiser_id.map(UserId),
            channel_id: self.channel_id.map(ChannelId),
            status: self.status.as_deref().map(str::parse).transpose()?,
        })
    }
}

/// Response body for `GET /deals`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DealListResponse {
    /// Deals on this page, newest first.
    pub data: Vec<DealDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Request body for `POST /deals/{id}/approval`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApprovalRequest {
    /// Acting user.
    pub approver_id: i64,
    /// `true` if acting as the advertiser, `false` as the channel owner.
    pub is_advertiser: bool,
    /// Reject instead of approve.
    #[serde(default)]
    pub reject: bool,
    /// Optional rejection reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for `POST /deals/{id}/actions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// Role the caller acts in: `advertiser` or `channel_owner`.
    pub actor_role: Role,
    /// Acting user.
    #[serde(default)]
    pub actor_id: Option<i64>,
    /// Action and its payload.
    pub action: DealAction,
}

impl ActionRequest {
    /// Resolves the acting party.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidRequest`] if `actor_id` is missing.
    /// - [`ServiceError::SystemRoleForbidden`] for the `system` role, which
    ///   is only served by the internal router.
    pub fn actor(&self) -> Result<Actor, ServiceError> {
        let user = || {
            self.actor_id
                .map(UserId)
                .ok_or_else(|| ServiceError::InvalidRequest("missing actor_id".to_string()))
        };
        Ok(match self.actor_role {
            Role::Advertiser => Actor::Advertiser(user()?),
            Role::ChannelOwner => Actor::ChannelOwner(user()?),
            Role::System => return Err(ServiceError::SystemRoleForbidden),
        })
    }
}

/// Request body for `POST /internal/v1/deals/{id}/system-actions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SystemActionRequest {
    /// Action and its payload, applied with the `system` role.
    pub action: DealAction,
}

/// Request body for `POST /deals/{id}/post-result`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PostResultRequest {
    /// Whether the post went live.
    pub success: bool,
    /// Publication time; defaults to now on success.
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    /// Failure reason.
    #[serde(default)]
    pub error: Option<String>,
}

impl PostResultRequest {
    /// Converts into the engine's result shape.
    #[must_use]
    pub fn into_result(self) -> Result<DateTime<Utc>, String> {
        if self.success {
            Ok(self.posted_at.unwrap_or_else(Utc::now))
        } else {
            Err(self.error.unwrap_or_else(|| "unspecified posting error".to_string()))
        }
    }
}

/// Response body for `GET /deals/{id}/escrow`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EscrowResponse {
    /// Deal identifier.
    pub deal_id: Uuid,
    /// Amount the ledger still holds for the deal.
    pub held: String,
    /// Currency of the held amount.
    pub currency: String,
    /// Current deal status.
    pub status: DealStatus,
}
