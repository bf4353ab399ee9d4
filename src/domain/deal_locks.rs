//! Per-deal transition locks.
//!
//! [`DealLocks`] keeps one [`tokio::sync::Mutex`] per deal in a `HashMap`
//! behind an outer [`tokio::sync::RwLock`]. A transition holds its deal's
//! lock from the initial read until the commit has landed, so nothing can
//! interleave between "escrow succeeded" and "status persisted".
//! Transitions on different deals never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::DealId;
use crate::error::ServiceError;

/// Guard proving exclusive access to one deal until dropped.
pub type DealGuard = OwnedMutexGuard<()>;

/// Registry of per-deal mutexes.
#[derive(Debug)]
pub struct DealLocks {
    locks: RwLock<HashMap<DealId, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl DealLocks {
    /// Creates an empty registry; acquisitions give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquires the lock for `deal_id`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConcurrentModification`] if the lock is not
    /// obtained within the configured timeout. Nothing has been read or
    /// written at that point, so the caller may retry.
    pub async fn acquire(&self, deal_id: DealId) -> Result<DealGuard, ServiceError> {
        let lock = self.lock_for(deal_id).await;
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%deal_id, "timed out waiting for deal lock");
                ServiceError::ConcurrentModification(deal_id)
            })
    }

    /// Drops the mutex of a deal that no one is holding or waiting on.
    ///
    /// Called once a deal reaches a terminal status.
    pub async fn prune(&self, deal_id: DealId) {
        let mut map = self.locks.write().await;
        if let Some(lock) = map.get(&deal_id)
            && Arc::strong_count(lock) == 1
        {
            map.remove(&deal_id);
        }
    }

    /// Returns the number of tracked deals.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// Returns `true` if no deal lock is tracked.
    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }

    async fn lock_for(&self, deal_id: DealId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&deal_id) {
            return Arc::clone(lock);
        }
        let mut map = self.locks.write().await;
        Arc::clone(map.entry(deal_id).or_default())
    }
}

impl Default for DealLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_first() {
        let locks = DealLocks::new(Duration::from_millis(50));
        let id = DealId::new();

        let Ok(guard) = locks.acquire(id).await else {
            panic!("first acquire failed");
        };
        let contended = locks.acquire(id).await;
        assert!(matches!(
            contended,
            Err(ServiceError::ConcurrentModification(d)) if d == id
        ));

        drop(guard);
        assert!(locks.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn different_deals_do_not_contend() {
        let locks = DealLocks::new(Duration::from_millis(50));
        let Ok(_a) = locks.acquire(DealId::new()).await else {
            panic!("acquire failed");
        };
        assert!(locks.acquire(DealId::new()).await.is_ok());
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn prune_removes_idle_locks_only() {
        let locks = DealLocks::default();
        let id = DealId::new();
        let Ok(guard) = locks.acquire(id).await else {
            panic!("acquire failed");
        };

        locks.prune(id).await;
        assert_eq!(locks.len().await, 1);

        drop(guard);
        locks.prune(id).await;
        assert!(locks.is_empty().await);
    }
}
