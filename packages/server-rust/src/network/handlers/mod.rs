//! HTTP handlers and the state they share.

pub mod health;
pub mod stats;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use stats::{dead_letters_handler, stats_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::aggregator::StatsReader;
use crate::consumer::ConsumerStats;
use crate::dead_letter::DeadLetterLog;

/// Shared state handed to every axum handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// Read access to the price aggregate.
    pub stats: Arc<dyn StatsReader>,
    /// Recent dead letters seen by the inspector.
    pub dead_letters: Arc<DeadLetterLog>,
    /// Consumer totals across partitions.
    pub consumer_stats: Arc<ConsumerStats>,
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, for uptime.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state() -> (AppState, Arc<crate::aggregator::Aggregator>) {
    let aggregator = Arc::new(crate::aggregator::Aggregator::new());
    let state = AppState {
        stats: aggregator.clone(),
        dead_letters: Arc::new(DeadLetterLog::new(16)),
        consumer_stats: Arc::new(ConsumerStats::new()),
        shutdown: Arc::new(ShutdownController::new()),
        start_time: Instant::now(),
    };
    (state, aggregator)
}
