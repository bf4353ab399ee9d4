//! Deal lifecycle engine: validates transitions, commits them together
//! with their ledger effect, and hands side effects to the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, mpsc};

use crate::dispatch::{Dispatcher, Job, PostOutcome};
use crate::domain::money::ensure_positive;
use crate::domain::transition::{self, TransitionRule};
use crate::domain::{
    Actor, Deal, DealAction, DealEvent, DealFilter, DealId, DealLocks, DealStatus, EventBus,
    LedgerEffect, NewDeal, TransactionKind, UserId,
};
use crate::error::ServiceError;
use crate::persistence::{Commit, DealWrite, Store};

use super::WalletService;

/// What one monitoring sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Approved or due scheduled deals whose publication was queued again.
    pub publications_resubmitted: usize,
    /// Posted deals moved into monitoring.
    pub monitoring_started: usize,
    /// Monitored deals whose funds were released.
    pub released: usize,
    /// Deals the sweep could not advance.
    pub failed: usize,
}

/// Orchestrates every deal transition.
///
/// Each transition follows the same steps: take the deal's lock, load it,
/// authorize the actor, look the move up in the transition table, commit
/// the ledger effect and the guarded status write as one unit, then emit
/// the event and queue notifications or publication. Side-effect failures
/// never undo a committed transition.
#[derive(Debug, Clone)]
pub struct DealService {
    store: Arc<dyn Store>,
    wallets: WalletService,
    locks: Arc<DealLocks>,
    event_bus: EventBus,
    dispatcher: Dispatcher,
    monitoring_window: chrono::Duration,
    /// Deals with a publish job queued or running in this process.
    publishing: Arc<Mutex<HashSet<DealId>>>,
}

#[derive(Debug)]
enum Resubmission {
    Skipped,
    Queued,
    Dropped,
}

impl DealService {
    /// Creates a new `DealService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        wallets: WalletService,
        locks: Arc<DealLocks>,
        event_bus: EventBus,
        dispatcher: Dispatcher,
        monitoring_window: Duration,
    ) -> Self {
        Self {
            store,
            wallets,
            locks,
            event_bus,
            dispatcher,
            monitoring_window: chrono::Duration::from_std(monitoring_window)
                .unwrap_or(chrono::Duration::MAX),
            publishing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the wallet service used for escrow.
    #[must_use]
    pub fn wallets(&self) -> &WalletService {
        &self.wallets
    }

    /// Creates a deal in `submitted`, or in `draft` when requested.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidAmount`] if the price is not positive.
    /// - [`ServiceError::InvalidRequest`] if the advertiser also owns the
    ///   channel or the brief is empty.
    pub async fn create_deal(&self, new: NewDeal) -> Result<Deal, ServiceError> {
        ensure_positive(new.price_amount)?;
        if new.advertiser_id == new.channel_owner_id {
            return Err(ServiceError::InvalidRequest(
                "advertiser and channel owner must be different users".to_string(),
            ));
        }
        if new.brief.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("brief must not be empty".to_string()));
        }

        let status = if new.as_draft {
            DealStatus::Draft
        } else {
            DealStatus::Submitted
        };
        let deal = Deal::from_new(new, status);
        self.store.insert_deal(&deal).await?;

        let _ = self.event_bus.publish(DealEvent::DealCreated {
            deal_id: deal.id,
            status,
            price_amount: deal.price_amount,
            price_currency: deal.price_currency.to_string(),
            timestamp: deal.created_at,
        });
        if status == DealStatus::Submitted {
            self.notify(&deal, deal.channel_owner_id, submitted_notice(&deal));
        }

        tracing::info!(
            deal_id = %deal.id,
            %status,
            advertiser_id = %deal.advertiser_id,
            channel_id = %deal.channel_id,
            price = %deal.price_amount,
            currency = %deal.price_currency,
            "deal created"
        );
        Ok(deal)
    }

    /// Loads a deal.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DealNotFound`] if no such deal exists.
    pub async fn get_deal(&self, deal_id: DealId) -> Result<Deal, ServiceError> {
        self.store
            .find_deal(deal_id)
            .await?
            .ok_or(ServiceError::DealNotFound(deal_id))
    }

    /// Lists deals matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] on storage failure.
    pub async fn list_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>, ServiceError> {
        self.store.list_deals(filter).await
    }

    /// Returns what the ledger still holds in escrow for a deal.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DealNotFound`] if no such deal exists.
    pub async fn escrow_held(&self, deal_id: DealId) -> Result<Decimal, ServiceError> {
        self.get_deal(deal_id).await?;
        self.wallets.escrow_held(deal_id).await
    }

    /// Approves or rejects a deal on behalf of one participant.
    ///
    /// The channel owner accepting a submitted deal escrows the price from
    /// the advertiser; the advertiser accepting a funded deal approves the
    /// creative and requests publication. Rejections cancel the deal,
    /// refunding the advertiser if the price was already held.
    ///
    /// # Errors
    ///
    /// See [`DealService::apply_action`].
    pub async fn approve_or_reject(
        &self,
        deal_id: DealId,
        approver_id: UserId,
        is_advertiser: bool,
        reject: bool,
        reason: Option<String>,
    ) -> Result<Deal, ServiceError> {
        let actor = if is_advertiser {
            Actor::Advertiser(approver_id)
        } else {
            Actor::ChannelOwner(approver_id)
        };
        let action = if reject {
            DealAction::Reject { reason }
        } else {
            DealAction::Accept
        };
        self.apply_action(deal_id, actor, action).await
    }

    /// Applies any action from the transition table.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::DealNotFound`] if the deal does not exist.
    /// - [`ServiceError::NotParticipant`] if the actor is not the deal's
    ///   advertiser or channel owner as claimed, or agrees to their own
    ///   proposal.
    /// - [`ServiceError::InvalidTransition`] if the table has no entry for
    ///   the current status, role and action.
    /// - [`ServiceError::MonitoringWindowOpen`] on an early release.
    /// - [`ServiceError::InsufficientFunds`] / [`ServiceError::EscrowExhausted`]
    ///   if the ledger effect cannot be applied; the deal is unchanged.
    /// - [`ServiceError::ConcurrentModification`] if the deal changed
    ///   underneath or its lock could not be taken in time.
    pub async fn apply_action(
        &self,
        deal_id: DealId,
        actor: Actor,
        action: DealAction,
    ) -> Result<Deal, ServiceError> {
        self.transition(deal_id, actor, action, Utc::now()).await
    }

    /// Feeds a publication result back into the deal.
    ///
    /// # Errors
    ///
    /// See [`DealService::apply_action`].
    pub async fn record_post_result(
        &self,
        deal_id: DealId,
        result: Result<DateTime<Utc>, String>,
    ) -> Result<Deal, ServiceError> {
        let action = match result {
            Ok(posted_at) => DealAction::PostSucceeded {
                posted_at: Some(posted_at),
            },
            Err(error) => DealAction::PostFailed { error },
        };
        let result = self.apply_action(deal_id, Actor::System, action).await;
        self.publishing.lock().await.remove(&deal_id);
        result
    }

    /// Advances posted deals into monitoring and releases funds for deals
    /// whose monitoring window ended before `now`.
    ///
    /// First queues publication again for `approved` deals, and for
    /// `scheduled` deals whose agreed time is not after `now`, that have
    /// no publish job in this process. That covers jobs dropped on a full
    /// queue and jobs lost to a restart or shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::PersistenceError`] if the deals cannot be
    /// listed. Failures on individual deals are logged and counted.
    pub async fn release_matured(&self, now: DateTime<Utc>) -> Result<SweepSummary, ServiceError> {
        let mut summary = SweepSummary::default();

        for status in [DealStatus::Approved, DealStatus::Scheduled] {
            let waiting = self
                .list_deals(&DealFilter {
                    status: Some(status),
                    ..DealFilter::default()
                })
                .await?;
            for deal in waiting.iter().filter(|d| awaits_publication(d, now)) {
                match self.resubmit_publication(deal.id, now).await {
                    Ok(Resubmission::Queued) => summary.publications_resubmitted += 1,
                    Ok(Resubmission::Skipped) => {}
                    Ok(Resubmission::Dropped) => summary.failed += 1,
                    Err(err) => {
                        summary.failed += 1;
                        tracing::warn!(
                            deal_id = %deal.id,
                            error = %err,
                            "could not resubmit publication"
                        );
                    }
                }
            }
        }

        let posted = self
            .list_deals(&DealFilter {
                status: Some(DealStatus::Posted),
                ..DealFilter::default()
            })
            .await?;
        for deal in posted {
            match self
                .transition(deal.id, Actor::System, DealAction::StartMonitoring, now)
                .await
            {
                Ok(_) => summary.monitoring_started += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(deal_id = %deal.id, error = %err, "could not start monitoring");
                }
            }
        }

        let monitoring = self
            .list_deals(&DealFilter {
                status: Some(DealStatus::Monitoring),
                ..DealFilter::default()
            })
            .await?;
        for deal in monitoring {
            if now < self.monitoring_ends(&deal) {
                continue;
            }
            match self
                .transition(deal.id, Actor::System, DealAction::MonitoringElapsed, now)
                .await
            {
                Ok(_) => summary.released += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(deal_id = %deal.id, error = %err, "could not release funds");
                }
            }
        }

        if summary != SweepSummary::default() {
            tracing::info!(
                publications_resubmitted = summary.publications_resubmitted,
                monitoring_started = summary.monitoring_started,
                released = summary.released,
                failed = summary.failed,
                "monitoring sweep finished"
            );
        }
        Ok(summary)
    }

    async fn resubmit_publication(
        &self,
        deal_id: DealId,
        now: DateTime<Utc>,
    ) -> Result<Resubmission, ServiceError> {
        let _guard = self.locks.acquire(deal_id).await?;
        let deal = self.get_deal(deal_id).await?;
        if !awaits_publication(&deal, now) {
            return Ok(Resubmission::Skipped);
        }
        let mut publishing = self.publishing.lock().await;
        if !publishing.insert(deal_id) {
            return Ok(Resubmission::Skipped);
        }
        if self.dispatcher.submit(publish_job(&deal)) {
            tracing::warn!(%deal_id, status = %deal.status, "publication resubmitted");
            Ok(Resubmission::Queued)
        } else {
            publishing.remove(&deal_id);
            Ok(Resubmission::Dropped)
        }
    }

    /// Consumes publication outcomes until the channel closes.
    pub async fn run_post_outcomes(self, mut outcomes: mpsc::Receiver<PostOutcome>) {
        while let Some(outcome) = outcomes.recv().await {
            let deal_id = outcome.deal_id;
            if let Err(err) = self.record_post_result(deal_id, outcome.result).await {
                tracing::error!(%deal_id, error = %err, "could not record post result");
            }
        }
    }

    /// Runs [`DealService::release_matured`] every `every` (at least one
    /// millisecond) until the task is aborted. The first sweep runs
    /// immediately, which also resubmits publications lost by a restart.
    pub async fn run_monitoring_sweeper(self, every: Duration) {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.release_matured(Utc::now()).await {
                tracing::error!(error = %err, "monitoring sweep failed");
            }
        }
    }

    async fn transition(
        &self,
        deal_id: DealId,
        actor: Actor,
        action: DealAction,
        now: DateTime<Utc>,
    ) -> Result<Deal, ServiceError> {
        let guard = self.locks.acquire(deal_id).await?;
        let deal = self.get_deal(deal_id).await?;
        authorize(&deal, actor)?;

        let kind = action.kind();
        let rule = transition::lookup(deal.status, actor.role(), kind).ok_or(
            ServiceError::InvalidTransition {
                from: deal.status,
                action: kind,
            },
        )?;

        let mut next = deal.clone();
        self.apply_payload(&mut next, actor, action, now)?;
        next.status = rule.to;
        next.updated_at = now;

        let mutations = match ledger_movement(&deal, rule.ledger) {
            Some((entry_kind, user_id)) => {
                match entry_kind {
                    TransactionKind::Escrow => next.payment_confirmed_at = Some(now),
                    TransactionKind::Payout => next.payout_at = Some(now),
                    TransactionKind::Refund => next.refund_at = Some(now),
                    TransactionKind::Deposit => {}
                }
                vec![
                    self.wallets
                        .mutation(
                            entry_kind,
                            deal.id,
                            user_id,
                            deal.price_amount,
                            &deal.price_currency,
                        )
                        .await?,
                ]
            }
            None => Vec::new(),
        };

        let receipt = self
            .store
            .commit(Commit {
                mutations,
                deal: Some(DealWrite {
                    deal: next,
                    expected_status: deal.status,
                }),
            })
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    %deal_id,
                    status = %deal.status,
                    action = %kind,
                    error = %err,
                    "transition not committed"
                );
            })?;
        if rule.publish {
            self.publishing.lock().await.insert(deal_id);
        }
        drop(guard);

        let updated = receipt
            .deal
            .ok_or_else(|| ServiceError::Internal("commit returned no deal".to_string()))?;
        tracing::info!(
            %deal_id,
            from = %deal.status,
            to = %updated.status,
            actor = %actor.role(),
            ledger = ?rule.ledger,
            "deal transition committed"
        );
        self.after_commit(&deal, &updated, actor, rule).await;
        Ok(updated)
    }

    fn apply_payload(
        &self,
        next: &mut Deal,
        actor: Actor,
        action: DealAction,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        match action {
            DealAction::Reject { reason } => next.rejection_reason = reason,
            DealAction::RequestChanges { reason } | DealAction::OpenDispute { reason } => {
                next.rejection_reason = Some(reason);
            }
            DealAction::SubmitDraft { text } => {
                if text.trim().is_empty() {
                    return Err(ServiceError::InvalidRequest(
                        "creative text must not be empty".to_string(),
                    ));
                }
                next.creative = Some(text);
            }
            DealAction::ProposePostTime { at } => {
                next.proposed_post_time = Some(at);
                next.proposed_by = actor.user_id();
            }
            DealAction::AgreePostTime => {
                let proposer = next.proposed_by;
                if let Some(user_id) = actor.user_id()
                    && proposer == Some(user_id)
                {
                    return Err(ServiceError::NotParticipant {
                        user_id,
                        deal_id: next.id,
                    });
                }
                next.agreed_post_time = next.proposed_post_time;
            }
            DealAction::PostSucceeded { posted_at } => {
                next.actual_post_time = Some(posted_at.unwrap_or(now));
                next.post_error = None;
            }
            DealAction::PostFailed { error } => next.post_error = Some(error),
            DealAction::RetryPost => next.post_error = None,
            DealAction::MonitoringElapsed => {
                let until = self.monitoring_ends(next);
                if now < until {
                    return Err(ServiceError::MonitoringWindowOpen {
                        deal_id: next.id,
                        until,
                    });
                }
            }
            DealAction::Submit
            | DealAction::Cancel
            | DealAction::Accept
            | DealAction::StartDraft
            | DealAction::RequestRefund
            | DealAction::StartMonitoring
            | DealAction::ResolveForOwner
            | DealAction::ResolveForAdvertiser
            | DealAction::ConfirmRefund => {}
        }
        Ok(())
    }

    fn monitoring_ends(&self, deal: &Deal) -> DateTime<Utc> {
        let posted = deal.actual_post_time.unwrap_or(deal.updated_at);
        posted
            .checked_add_signed(self.monitoring_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    async fn after_commit(&self, before: &Deal, after: &Deal, actor: Actor, rule: &TransitionRule) {
        let _ = self.event_bus.publish(DealEvent::StatusChanged {
            deal_id: after.id,
            from: before.status,
            to: after.status,
            actor: actor.role(),
            timestamp: after.updated_at,
        });

        let text = status_notice(after);
        match actor {
            Actor::Advertiser(_) => self.notify(after, after.channel_owner_id, text),
            Actor::ChannelOwner(_) => self.notify(after, after.advertiser_id, text),
            Actor::System => {
                self.notify(after, after.advertiser_id, text.clone());
                self.notify(after, after.channel_owner_id, text);
            }
        }

        if rule.publish && !self.dispatcher.submit(publish_job(after)) {
            self.publishing.lock().await.remove(&after.id);
        }

        if after.status.is_terminal() {
            self.locks.prune(after.id).await;
        }
    }

    fn notify(&self, deal: &Deal, user_id: UserId, text: String) {
        self.dispatcher.submit(Job::Notify {
            deal_id: deal.id,
            user_id,
            text,
        });
    }
}

/// Whether the deal waits for a publication that is already due.
fn awaits_publication(deal: &Deal, now: DateTime<Utc>) -> bool {
    match deal.status {
        DealStatus::Approved => true,
        DealStatus::Scheduled => deal.agreed_post_time.is_none_or(|at| at <= now),
        _ => false,
    }
}

fn publish_job(deal: &Deal) -> Job {
    let scheduled_time = if deal.status == DealStatus::Scheduled {
        deal.agreed_post_time
    } else {
        None
    };
    Job::Publish {
        deal_id: deal.id,
        channel_id: deal.channel_id,
        content: deal.content().to_string(),
        scheduled_time,
    }
}

fn authorize(deal: &Deal, actor: Actor) -> Result<(), ServiceError> {
    let allowed = match actor {
        Actor::Advertiser(id) => id == deal.advertiser_id,
        Actor::ChannelOwner(id) => id == deal.channel_owner_id,
        Actor::System => true,
    };
    match actor.user_id() {
        Some(user_id) if !allowed => Err(ServiceError::NotParticipant {
            user_id,
            deal_id: deal.id,
        }),
        _ => Ok(()),
    }
}

/// Ledger entry kind and wallet owner for a transition's money movement.
fn ledger_movement(deal: &Deal, effect: LedgerEffect) -> Option<(TransactionKind, UserId)> {
    match effect {
        LedgerEffect::None => None,
        LedgerEffect::Escrow => Some((TransactionKind::Escrow, deal.advertiser_id)),
        LedgerEffect::Release => Some((TransactionKind::Payout, deal.channel_owner_id)),
        LedgerEffect::Refund => Some((TransactionKind::Refund, deal.advertiser_id)),
    }
}

fn submitted_notice(deal: &Deal) -> String {
    format!(
        "New sponsored post request for {price} {currency}: {brief}",
        price = deal.price_amount,
        currency = deal.price_currency,
        brief = deal.brief
    )
}

fn status_notice(deal: &Deal) -> String {
    let price = format!("{} {}", deal.price_amount, deal.price_currency);
    match deal.status {
        DealStatus::Submitted => submitted_notice(deal),
        DealStatus::Funded => format!("Deal accepted. {price} is held in escrow."),
        DealStatus::Approved => "Creative approved. Publishing now.".to_string(),
        DealStatus::DraftPending => "The channel owner is preparing the post.".to_string(),
        DealStatus::DraftSubmitted => format!("Draft ready for review:\n\n{}", deal.content()),
        DealStatus::ChangesRequested => format!(
            "Changes requested: {}",
            deal.rejection_reason.as_deref().unwrap_or("no details")
        ),
        DealStatus::Scheduling => match deal.proposed_post_time {
            Some(at) => format!("Proposed publication time: {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => "Publication time under discussion.".to_string(),
        },
        DealStatus::Scheduled => match deal.agreed_post_time {
            Some(at) => format!("Post scheduled for {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => "Post scheduled.".to_string(),
        },
        DealStatus::Posted => "The post is live.".to_string(),
        DealStatus::Monitoring => "The post is live and being monitored.".to_string(),
        DealStatus::Released => format!("Deal complete. {price} paid to the channel owner."),
        DealStatus::Cancelled => match &deal.rejection_reason {
            Some(reason) => format!("Deal cancelled: {reason}"),
            None => "Deal cancelled.".to_string(),
        },
        DealStatus::Rejected => format!("The channel owner declined the deal. {price} refunded."),
        DealStatus::FailedToPost => format!(
            "Publication failed: {}",
            deal.post_error.as_deref().unwrap_or("unknown error")
        ),
        DealStatus::Disputed => "The advertiser opened a dispute.".to_string(),
        DealStatus::Refunded => format!("{price} refunded to the advertiser."),
        DealStatus::PendingRefund => "A refund is pending.".to_string(),
        DealStatus::Draft => "Deal saved as draft.".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, Currency, Role};
    use crate::persistence::MemoryStore;
    use rust_decimal_macros::dec;

    const ADVERTISER: UserId = UserId(1);
    const OWNER: UserId = UserId(2);

    struct Harness {
        deals: DealService,
        store: Arc<MemoryStore>,
        jobs: mpsc::Receiver<Job>,
    }

    fn usd() -> Currency {
        let Ok(c) = Currency::new("USD") else {
            panic!("valid currency");
        };
        c
    }

    fn harness(window: Duration) -> Harness {
        harness_over(Arc::new(MemoryStore::new()), window, 64)
    }

    /// A fresh service over `store`, as after a process restart.
    fn harness_over(store: Arc<MemoryStore>, window: Duration, queue: usize) -> Harness {
        let bus = EventBus::new(64);
        let (dispatcher, jobs) = Dispatcher::channel(queue, bus.clone());
        let wallets = WalletService::new(Arc::clone(&store) as Arc<dyn Store>, Decimal::ZERO);
        let deals = DealService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            wallets,
            Arc::new(DealLocks::default()),
            bus,
            dispatcher,
            window,
        );
        Harness { deals, store, jobs }
    }

    fn drain_publications(jobs: &mut mpsc::Receiver<Job>) -> Vec<(DealId, Option<DateTime<Utc>>)> {
        let mut published = Vec::new();
        while let Ok(job) = jobs.try_recv() {
            if let Job::Publish {
                deal_id,
                scheduled_time,
                ..
            } = job
            {
                published.push((deal_id, scheduled_time));
            }
        }
        published
    }

    fn new_deal() -> NewDeal {
        NewDeal {
            advertiser_id: ADVERTISER,
            channel_id: ChannelId(-100),
            channel_owner_id: OWNER,
            campaign_id: None,
            price_amount: dec!(500),
            price_currency: usd(),
            brief: "Try our VPN".to_string(),
            as_draft: false,
        }
    }

    async fn funded(h: &Harness) -> Deal {
        let _ = h.deals.wallets().deposit(ADVERTISER, dec!(1000), &usd()).await;
        let Ok(deal) = h.deals.create_deal(new_deal()).await else {
            panic!("create failed");
        };
        let Ok(deal) = h.deals.approve_or_reject(deal.id, OWNER, false, false, None).await else {
            panic!("accept failed");
        };
        deal
    }

    #[tokio::test]
    async fn create_rejects_non_positive_price() {
        let h = harness(Duration::from_secs(60));
        let mut new = new_deal();
        new.price_amount = dec!(0);
        assert!(matches!(
            h.deals.create_deal(new).await,
            Err(ServiceError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn create_notifies_channel_owner() {
        let mut h = harness(Duration::from_secs(60));
        let Ok(deal) = h.deals.create_deal(new_deal()).await else {
            panic!("create failed");
        };
        assert_eq!(deal.status, DealStatus::Submitted);
        let Ok(Job::Notify { user_id, .. }) = h.jobs.try_recv() else {
            panic!("expected a notification job");
        };
        assert_eq!(user_id, OWNER);
    }

    #[tokio::test]
    async fn owner_acceptance_escrows_price() {
        let h = harness(Duration::from_secs(60));
        let deal = funded(&h).await;
        assert_eq!(deal.status, DealStatus::Funded);
        assert!(deal.payment_confirmed_at.is_some());
        assert_eq!(h.deals.escrow_held(deal.id).await.unwrap_or_default(), dec!(500));
    }

    #[tokio::test]
    async fn wrong_user_is_not_a_participant() {
        let h = harness(Duration::from_secs(60));
        let Ok(deal) = h.deals.create_deal(new_deal()).await else {
            panic!("create failed");
        };
        let result = h
            .deals
            .approve_or_reject(deal.id, UserId(99), false, false, None)
            .await;
        assert!(matches!(result, Err(ServiceError::NotParticipant { .. })));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_deal_submitted() {
        let h = harness(Duration::from_secs(60));
        let _ = h.deals.wallets().deposit(ADVERTISER, dec!(1000), &usd()).await;
        let Ok(deal) = h.deals.create_deal(new_deal()).await else {
            panic!("create failed");
        };
        h.store.fail_next_commits(1);

        let result = h.deals.approve_or_reject(deal.id, OWNER, false, false, None).await;
        assert!(matches!(result, Err(ServiceError::PersistenceError(_))));

        let Ok(reloaded) = h.deals.get_deal(deal.id).await else {
            panic!("deal missing");
        };
        assert_eq!(reloaded.status, DealStatus::Submitted);
        assert_eq!(h.deals.escrow_held(deal.id).await.unwrap_or_default(), dec!(0));
    }

    #[tokio::test]
    async fn proposer_cannot_agree_to_own_time() {
        let h = harness(Duration::from_secs(60));
        let deal = funded(&h).await;
        let at = Utc::now() + chrono::Duration::hours(2);
        let _ = h
            .deals
            .apply_action(deal.id, Actor::Advertiser(ADVERTISER), DealAction::ProposePostTime { at })
            .await;

        let own = h
            .deals
            .apply_action(deal.id, Actor::Advertiser(ADVERTISER), DealAction::AgreePostTime)
            .await;
        assert!(matches!(own, Err(ServiceError::NotParticipant { .. })));

        let Ok(agreed) = h
            .deals
            .apply_action(deal.id, Actor::ChannelOwner(OWNER), DealAction::AgreePostTime)
            .await
        else {
            panic!("agree failed");
        };
        assert_eq!(agreed.status, DealStatus::Scheduled);
        assert_eq!(agreed.agreed_post_time, Some(at));
    }

    #[tokio::test]
    async fn scheduled_deal_requests_timed_publication() {
        let mut h = harness(Duration::from_secs(60));
        let deal = funded(&h).await;
        let at = Utc::now() + chrono::Duration::hours(2);
        let _ = h
            .deals
            .apply_action(deal.id, Actor::ChannelOwner(OWNER), DealAction::ProposePostTime { at })
            .await;
        let _ = h
            .deals
            .apply_action(deal.id, Actor::Advertiser(ADVERTISER), DealAction::AgreePostTime)
            .await;

        let mut publish = None;
        while let Ok(job) = h.jobs.try_recv() {
            if let Job::Publish { scheduled_time, .. } = job {
                publish = Some(scheduled_time);
            }
        }
        assert_eq!(publish, Some(Some(at)));
    }

    #[tokio::test]
    async fn release_waits_for_monitoring_window() {
        let h = harness(Duration::from_secs(3600));
        let deal = funded(&h).await;
        let _ = h.deals.approve_or_reject(deal.id, ADVERTISER, true, false, None).await;
        let posted_at = Utc::now();
        let _ = h.deals.record_post_result(deal.id, Ok(posted_at)).await;
        let _ = h
            .deals
            .apply_action(deal.id, Actor::System, DealAction::StartMonitoring)
            .await;

        let early = h
            .deals
            .apply_action(deal.id, Actor::System, DealAction::MonitoringElapsed)
            .await;
        assert!(matches!(early, Err(ServiceError::MonitoringWindowOpen { .. })));

        let later = posted_at + chrono::Duration::hours(2);
        let Ok(summary) = h.deals.release_matured(later).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.released, 1);

        let Ok(released) = h.deals.get_deal(deal.id).await else {
            panic!("deal missing");
        };
        assert_eq!(released.status, DealStatus::Released);
        assert!(released.payout_at.is_some());
        let Ok(owner_wallet) = h.deals.wallets().wallet(OWNER, &usd()).await else {
            panic!("owner wallet missing");
        };
        assert_eq!(owner_wallet.balance, dec!(500));
    }

    #[tokio::test]
    async fn sweep_moves_posted_deals_into_monitoring() {
        let h = harness(Duration::from_secs(3600));
        let deal = funded(&h).await;
        let _ = h.deals.approve_or_reject(deal.id, ADVERTISER, true, false, None).await;
        let _ = h.deals.record_post_result(deal.id, Ok(Utc::now())).await;

        let Ok(summary) = h.deals.release_matured(Utc::now()).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.monitoring_started, 1);
        assert_eq!(summary.released, 0);
    }

    #[tokio::test]
    async fn failed_post_can_be_refunded() {
        let h = harness(Duration::from_secs(60));
        let deal = funded(&h).await;
        let _ = h.deals.approve_or_reject(deal.id, ADVERTISER, true, false, None).await;
        let Ok(failed) = h
            .deals
            .record_post_result(deal.id, Err("chat not found".to_string()))
            .await
        else {
            panic!("post result not recorded");
        };
        assert_eq!(failed.status, DealStatus::FailedToPost);
        assert_eq!(failed.post_error.as_deref(), Some("chat not found"));

        let _ = h
            .deals
            .apply_action(deal.id, Actor::System, DealAction::RequestRefund)
            .await;
        let Ok(refunded) = h
            .deals
            .apply_action(deal.id, Actor::System, DealAction::ConfirmRefund)
            .await
        else {
            panic!("refund failed");
        };
        assert_eq!(refunded.status, DealStatus::Refunded);
        let Ok(wallet) = h.deals.wallets().wallet(ADVERTISER, &usd()).await else {
            panic!("wallet missing");
        };
        assert_eq!(wallet.balance, dec!(1000));
    }

    #[tokio::test]
    async fn publication_dropped_on_full_queue_is_resubmitted() {
        let mut h = harness_over(Arc::new(MemoryStore::new()), Duration::from_secs(60), 1);
        let deal = funded(&h).await;
        let Ok(approved) = h.deals.approve_or_reject(deal.id, ADVERTISER, true, false, None).await
        else {
            panic!("creative approval failed");
        };
        assert_eq!(approved.status, DealStatus::Approved);
        assert!(drain_publications(&mut h.jobs).is_empty());

        let Ok(summary) = h.deals.release_matured(Utc::now()).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.publications_resubmitted, 1);
        assert_eq!(drain_publications(&mut h.jobs), vec![(deal.id, None)]);

        let Ok(summary) = h.deals.release_matured(Utc::now()).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.publications_resubmitted, 0);

        let Ok(posted) = h.deals.record_post_result(deal.id, Ok(Utc::now())).await else {
            panic!("post result not recorded");
        };
        assert_eq!(posted.status, DealStatus::Posted);
    }

    #[tokio::test]
    async fn in_flight_publication_is_not_queued_twice() {
        let mut h = harness(Duration::from_secs(60));
        let deal = funded(&h).await;
        let _ = h.deals.approve_or_reject(deal.id, ADVERTISER, true, false, None).await;
        assert_eq!(drain_publications(&mut h.jobs), vec![(deal.id, None)]);

        let Ok(summary) = h.deals.release_matured(Utc::now()).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.publications_resubmitted, 0);
        assert!(drain_publications(&mut h.jobs).is_empty());
    }

    #[tokio::test]
    async fn restarted_service_resubmits_pending_publications() {
        let h = harness(Duration::from_secs(60));
        let approved = funded(&h).await;
        let _ = h
            .deals
            .approve_or_reject(approved.id, ADVERTISER, true, false, None)
            .await;

        let scheduled = funded(&h).await;
        let at = Utc::now() + chrono::Duration::hours(2);
        let _ = h
            .deals
            .apply_action(scheduled.id, Actor::ChannelOwner(OWNER), DealAction::ProposePostTime { at })
            .await;
        let Ok(agreed) = h
            .deals
            .apply_action(scheduled.id, Actor::Advertiser(ADVERTISER), DealAction::AgreePostTime)
            .await
        else {
            panic!("agree failed");
        };
        assert_eq!(agreed.status, DealStatus::Scheduled);

        let mut restarted = harness_over(Arc::clone(&h.store), Duration::from_secs(60), 64);
        drop(h);

        let Ok(summary) = restarted.deals.release_matured(Utc::now()).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.publications_resubmitted, 1);
        assert_eq!(drain_publications(&mut restarted.jobs), vec![(approved.id, None)]);

        let due = at + chrono::Duration::seconds(1);
        let Ok(summary) = restarted.deals.release_matured(due).await else {
            panic!("sweep failed");
        };
        assert_eq!(summary.publications_resubmitted, 1);
        assert_eq!(
            drain_publications(&mut restarted.jobs),
            vec![(scheduled.id, Some(at))]
        );
    }

    #[test]
    fn authorize_checks_claimed_role() {
        let deal = Deal::from_new(new_deal(), DealStatus::Submitted);
        assert!(authorize(&deal, Actor::Advertiser(ADVERTISER)).is_ok());
        assert!(authorize(&deal, Actor::ChannelOwner(ADVERTISER)).is_err());
        assert!(authorize(&deal, Actor::System).is_ok());
        assert_eq!(Actor::System.role(), Role::System);
    }
}
