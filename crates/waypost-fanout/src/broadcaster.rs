use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use waypost_core::{LocationSample, SubscriberId};

use crate::manager::SubscriptionManager;
use crate::subscription::{CloseReason, Delivery, SubscriptionFilter, SubscriptionHandle};

/// Outcome of one publish, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub seq: u64,
    /// Subscribers the sample was queued for.
    pub delivered: usize,
    /// Subscribers skipped by their filter.
    pub filtered: usize,
    /// Subscribers removed because their queue was full or closed.
    pub evicted: usize,
}

/// Fans each published sample out to every live subscriber.
///
/// Publishing never waits on a subscriber: each one has a bounded queue and
/// a publish that finds it full or closed removes that subscriber and moves
/// on. Publishes are serialized by `gate`, so every subscriber observes the
/// same global publish order.
pub struct Broadcaster {
    manager: Arc<SubscriptionManager>,
    /// Next publish sequence number.
    gate: Mutex<u64>,
}

impl Broadcaster {
    /// Broadcaster whose subscribers each get a queue of `queue_capacity`.
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_manager(Arc::new(SubscriptionManager::new(queue_capacity)))
    }

    pub fn with_manager(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            manager,
            gate: Mutex::new(0),
        }
    }

    /// Subscribe to every published sample.
    pub fn subscribe(&self) -> SubscriptionHandle {
        self.manager.subscribe(SubscriptionFilter::All)
    }

    /// Subscribe to the samples matching `filter`.
    pub fn subscribe_filtered(&self, filter: SubscriptionFilter) -> SubscriptionHandle {
        self.manager.subscribe(filter)
    }

    /// Remove a subscriber by id. Idempotent.
    pub fn unsubscribe(&self, id: &SubscriberId, reason: CloseReason) -> bool {
        self.manager.unsubscribe(id, reason)
    }

    pub fn subscriber_count(&self) -> usize {
        self.manager.len()
    }

    /// Gracefully end every subscription (service shutdown).
    pub fn close_all(&self) -> usize {
        self.manager.close_all()
    }

    /// Queue `sample` for every live subscriber whose filter matches.
    pub fn publish(&self, sample: Arc<LocationSample>) -> PublishReport {
        let mut next_seq = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *next_seq;
        *next_seq += 1;

        let mut report = PublishReport {
            seq,
            ..Default::default()
        };

        for target in self.manager.snapshot() {
            if !target.filter.matches(&sample) {
                report.filtered += 1;
                continue;
            }

            let delivery = Delivery {
                seq,
                sample: Arc::clone(&sample),
            };
            match target.tx.try_send(delivery) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %target.id, seq, "subscriber queue full, evicting");
                    self.manager.unsubscribe(&target.id, CloseReason::Failed);
                    report.evicted += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %target.id, seq, "subscriber queue closed");
                    self.manager.unsubscribe(&target.id, CloseReason::Dropped);
                    report.evicted += 1;
                }
            }
        }
        drop(next_seq);

        debug!(
            seq,
            identity = %sample.identity,
            delivered = report.delivered,
            filtered = report.filtered,
            evicted = report.evicted,
            "sample published"
        );
        report
    }
}
