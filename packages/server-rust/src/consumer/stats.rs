//! Process-wide consumer counters shared by all partitions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Totals across every partition consumer since startup.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    reported: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatsSnapshot {
    pub processed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Dead letters the sink never acknowledged and that were logged instead.
    pub reported: u64,
}

impl ConsumerStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reported(&self) {
        self.reported.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            reported: self.reported.load(Ordering::Relaxed),
        }
    }
}
