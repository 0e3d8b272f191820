use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument};
use waypost_core::config::DEFAULT_RETENTION;
use waypost_core::{Identity, LocationSample};

/// Bounded, per-identity location history.
///
/// Each identity maps to a `VecDeque` held inside a `DashMap` shard. An
/// append holds the shard's write lock for the push and the trim, so readers
/// never see a sequence that is mid-append or over the retention bound.
/// Appends to different identities proceed in parallel unless they hash to
/// the same shard.
pub struct HistoryStore {
    entries: DashMap<Identity, VecDeque<Arc<LocationSample>>>,
    retention: usize,
}

impl HistoryStore {
    /// Store with the default retention bound (200 samples per identity).
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Store keeping at most `retention` samples per identity (minimum 1).
    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: DashMap::new(),
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a sample to `identity`'s history, evicting the oldest samples
    /// once the retention bound is exceeded.
    #[instrument(level = "debug", skip(self, sample), fields(identity = %identity))]
    pub fn append(&self, identity: &Identity, sample: impl Into<Arc<LocationSample>>) {
        let mut seq = self.entries.entry(identity.clone()).or_default();
        seq.push_back(sample.into());

        let overflow = seq.len().saturating_sub(self.retention);
        if overflow > 0 {
            seq.drain(..overflow);
            debug!(evicted = overflow, "history trimmed");
        }
    }

    /// Snapshot of `identity`'s history in arrival order.
    ///
    /// Unknown identities yield an empty vec.
    pub fn get(&self, identity: &Identity) -> Vec<Arc<LocationSample>> {
        self.entries
            .get(identity)
            .map(|seq| seq.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of samples currently held for `identity`.
    pub fn len(&self, identity: &Identity) -> usize {
        self.entries.get(identity).map(|seq| seq.len()).unwrap_or(0)
    }

    pub fn identity_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
