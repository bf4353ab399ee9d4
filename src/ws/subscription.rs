//! Per-connection subscription manager.
//!
//! Tracks which deals a WebSocket client follows and filters events
//! server-side.

use std::collections::HashSet;

use crate::domain::DealId;

/// Deal subscriptions of a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    deal_ids: HashSet<DealId>,
    /// Wildcard `"*"`: every deal matches and `deal_ids` is ignored.
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds deals to the subscription set.
    pub fn subscribe(&mut self, ids: &[DealId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.deal_ids.extend(ids.iter().copied());
    }

    /// Removes deals from the subscription set. `wildcard` clears `"*"`.
    pub fn unsubscribe(&mut self, ids: &[DealId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.deal_ids.remove(id);
        }
    }

    /// Returns `true` if events of `deal_id` should be forwarded.
    #[must_use]
    pub fn matches(&self, deal_id: DealId) -> bool {
        self.subscribe_all || self.deal_ids.contains(&deal_id)
    }

    /// Number of explicitly subscribed deals.
    #[must_use]
    pub fn count(&self) -> usize {
        self.deal_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        assert!(!SubscriptionManager::new().matches(DealId::new()));
    }

    #[test]
    fn specific_deal_only() {
        let mut mgr = SubscriptionManager::new();
        let id = DealId::new();
        mgr.subscribe(&[id], false);
        assert!(mgr.matches(id));
        assert!(!mgr.matches(DealId::new()));
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn wildcard_can_be_dropped() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(DealId::new()));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.is_subscribed_all());
        assert!(!mgr.matches(DealId::new()));
    }
}
