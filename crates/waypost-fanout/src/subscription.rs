use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use waypost_core::{Identity, LocationSample, SubscriberId};

use crate::manager::SubscriptionManager;

/// One sample queued for a subscriber, stamped with its global publish sequence.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub seq: u64,
    pub sample: Arc<LocationSample>,
}

/// Which published samples a subscriber wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// Every published sample (the default).
    #[default]
    All,
    /// Only samples for one identity.
    Identity(Identity),
}

impl SubscriptionFilter {
    pub fn matches(&self, sample: &LocationSample) -> bool {
        match self {
            SubscriptionFilter::All => true,
            SubscriptionFilter::Identity(id) => &sample.identity == id,
        }
    }
}

/// Why a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit close by the subscriber or the service shutting down.
    Graceful,
    /// The outbound queue was full or a write to the peer failed.
    Failed,
    /// The peer disconnected.
    Dropped,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Graceful => "graceful",
            CloseReason::Failed => "failed",
            CloseReason::Dropped => "dropped",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber lifecycle: linear progression, no backwards transitions.
///
/// `Connecting → Active → {Closing | Failed | Dropped} → Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Active,
    Closing,
    Failed,
    Dropped,
    Removed,
}

impl SubscriberState {
    fn rank(self) -> u8 {
        match self {
            SubscriberState::Connecting => 0,
            SubscriberState::Active => 1,
            SubscriberState::Closing | SubscriberState::Failed | SubscriberState::Dropped => 2,
            SubscriberState::Removed => 3,
        }
    }

    fn terminal(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Graceful => SubscriberState::Closing,
            CloseReason::Failed => SubscriberState::Failed,
            CloseReason::Dropped => SubscriberState::Dropped,
        }
    }
}

/// Lifecycle shared between a handle and its registry entry.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: SubscriberState,
    reason: Option<CloseReason>,
}

pub(crate) type SharedLifecycle = Arc<Mutex<Lifecycle>>;

pub(crate) fn new_lifecycle() -> SharedLifecycle {
    Arc::new(Mutex::new(Lifecycle {
        state: SubscriberState::Connecting,
        reason: None,
    }))
}

/// Advance to `next` if it is later in the lifecycle. Returns whether it moved.
pub(crate) fn advance(lifecycle: &SharedLifecycle, next: SubscriberState) -> bool {
    let mut guard = lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
    if next.rank() <= guard.state.rank() {
        return false;
    }
    guard.state = next;
    true
}

/// Move through the terminal state for `reason`, recording the reason.
/// Returns false if the subscription had already ended.
pub(crate) fn terminate(lifecycle: &SharedLifecycle, reason: CloseReason) -> bool {
    let mut guard = lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
    let next = SubscriberState::terminal(reason);
    if next.rank() <= guard.state.rank() {
        return false;
    }
    guard.state = next;
    guard.reason = Some(reason);
    true
}

/// A live subscription: receives every matching sample published after it
/// was registered, in publish order.
///
/// Dropping the handle unsubscribes it.
pub struct SubscriptionHandle {
    id: SubscriberId,
    filter: SubscriptionFilter,
    rx: mpsc::Receiver<Delivery>,
    lifecycle: SharedLifecycle,
    manager: Arc<SubscriptionManager>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriberId,
        filter: SubscriptionFilter,
        rx: mpsc::Receiver<Delivery>,
        lifecycle: SharedLifecycle,
        manager: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            id,
            filter,
            rx,
            lifecycle,
            manager,
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Next queued delivery. Returns `None` once the subscription has been
    /// removed and everything queued before removal has been drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub fn state(&self) -> SubscriberState {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Why the subscription ended, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reason
    }

    /// Remove this subscription from the live set. Idempotent.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.manager.unsubscribe(&self.id, reason)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.manager.unsubscribe(&self.id, CloseReason::Graceful);
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("state", &self.state())
            .finish()
    }
}
