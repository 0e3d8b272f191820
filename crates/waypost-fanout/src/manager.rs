use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;
use waypost_core::config::DEFAULT_QUEUE_CAPACITY;
use waypost_core::SubscriberId;

use crate::subscription::{
    advance, new_lifecycle, terminate, CloseReason, Delivery, SharedLifecycle, SubscriberState,
    SubscriptionFilter, SubscriptionHandle,
};

/// Registry entry for one live subscriber.
struct Entry {
    tx: mpsc::Sender<Delivery>,
    filter: SubscriptionFilter,
    lifecycle: SharedLifecycle,
}

/// Point-in-time copy of a registry entry, taken by the publish path so that
/// no registry lock is held while sending.
pub(crate) struct Target {
    pub id: SubscriberId,
    pub tx: mpsc::Sender<Delivery>,
    pub filter: SubscriptionFilter,
}

/// Owns the live subscriber set.
///
/// Each subscriber gets a bounded queue of `capacity` deliveries. The
/// registry is a `DashMap`, so register/remove only contend with a publish
/// while it copies the entries out.
pub struct SubscriptionManager {
    subscribers: DashMap<SubscriberId, Entry>,
    capacity: usize,
}

impl SubscriptionManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Outbound queue depth given to each subscriber.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new subscriber and return its handle.
    pub fn subscribe(self: &Arc<Self>, filter: SubscriptionFilter) -> SubscriptionHandle {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.capacity);
        let lifecycle = new_lifecycle();

        self.subscribers.insert(
            id.clone(),
            Entry {
                tx,
                filter: filter.clone(),
                lifecycle: Arc::clone(&lifecycle),
            },
        );
        advance(&lifecycle, SubscriberState::Active);
        info!(subscriber = %id, ?filter, total = self.subscribers.len(), "subscriber registered");

        SubscriptionHandle::new(id, filter, rx, lifecycle, Arc::clone(self))
    }

    /// Remove a subscriber from the live set.
    ///
    /// Idempotent: returns false if the subscriber was already removed. The
    /// subscriber's queue closes once its last in-flight delivery is drained.
    pub fn unsubscribe(&self, id: &SubscriberId, reason: CloseReason) -> bool {
        let Some((_, entry)) = self.subscribers.remove(id) else {
            return false;
        };
        terminate(&entry.lifecycle, reason);
        advance(&entry.lifecycle, SubscriberState::Removed);
        info!(
            subscriber = %id,
            %reason,
            total = self.subscribers.len(),
            "subscriber removed"
        );
        true
    }

    /// Copy out every live subscriber's sender and filter.
    pub(crate) fn snapshot(&self) -> Vec<Target> {
        self.subscribers
            .iter()
            .map(|e| Target {
                id: e.key().clone(),
                tx: e.value().tx.clone(),
                filter: e.value().filter.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    /// Gracefully remove every subscriber. Returns how many were removed.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.unsubscribe(id, CloseReason::Graceful))
            .count()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_registers_an_active_subscriber() {
        let manager = Arc::new(SubscriptionManager::new(4));
        let handle = manager.subscribe(SubscriptionFilter::All);

        assert_eq!(handle.state(), SubscriberState::Active);
        assert!(manager.contains(handle.id()));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn unknown_subscriber_unsubscribe_is_noop() {
        let manager = SubscriptionManager::new(4);
        assert!(!manager.unsubscribe(&SubscriberId::new(), CloseReason::Dropped));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let manager = Arc::new(SubscriptionManager::new(4));
        let handle = manager.subscribe(SubscriptionFilter::All);

        assert!(handle.close(CloseReason::Dropped));
        assert!(!handle.close(CloseReason::Graceful));
        assert!(!manager.unsubscribe(handle.id(), CloseReason::Failed));

        assert_eq!(handle.state(), SubscriberState::Removed);
        assert_eq!(handle.close_reason(), Some(CloseReason::Dropped));
        assert!(manager.is_empty());
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let manager = Arc::new(SubscriptionManager::new(4));
        let handle = manager.subscribe(SubscriptionFilter::All);
        let id = handle.id().clone();

        drop(handle);
        assert!(!manager.contains(&id));
    }

    #[test]
    fn close_all_empties_the_registry() {
        let manager = Arc::new(SubscriptionManager::new(4));
        let a = manager.subscribe(SubscriptionFilter::All);
        let b = manager.subscribe(SubscriptionFilter::All);

        assert_eq!(manager.close_all(), 2);
        assert!(manager.is_empty());
        assert_eq!(a.close_reason(), Some(CloseReason::Graceful));
        assert_eq!(b.state(), SubscriberState::Removed);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(SubscriptionManager::new(0).capacity(), 1);
    }
}
