//! Shared price aggregate.
//!
//! One [`Aggregator`] is shared (via `Arc`) by every partition consumer.
//! The (count, sum) pair sits behind a single mutex, so an update is applied
//! as a whole and a snapshot never sees a sum without its count.
//! [`AveragePublisher`] forwards the average after each update to the
//! average-price topic.

use std::sync::Arc;

use orderflow_core::{AggregateSnapshot, AggregateState, AveragePrice, PriceStats};
use parking_lot::Mutex;
use tracing::warn;

use crate::broker::OutboundRecord;
use crate::traits::EventBroker;

/// Thread-safe running aggregate over processed prices.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregateState>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one price and returns the aggregate as of this update.
    /// Callers pass only validated prices.
    pub fn update(&self, price: f64) -> AggregateSnapshot {
        let mut state = self.state.lock();
        state.apply(price);
        state.snapshot()
    }

    /// Consistent (count, sum, average) view.
    #[must_use]
    pub fn snapshot(&self) -> AggregateSnapshot {
        self.state.lock().snapshot()
    }
}

/// Read-only access to aggregate stats for external consumers.
pub trait StatsReader: Send + Sync {
    /// Current stats; zero-valued before anything was processed.
    fn stats(&self) -> PriceStats;
}

impl StatsReader for Aggregator {
    fn stats(&self) -> PriceStats {
        PriceStats::from(self.snapshot())
    }
}

/// Record key of every average-price record.
pub const AVERAGE_PRICE_KEY: &str = "global-average";

/// Publishes the running average to the average-price topic.
///
/// A failed publish is logged and dropped: the order already counts in the
/// aggregate and the next update carries a newer average.
#[derive(Clone)]
pub struct AveragePublisher {
    broker: Arc<dyn EventBroker<AveragePrice>>,
    topic: String,
}

impl AveragePublisher {
    #[must_use]
    pub fn new(broker: Arc<dyn EventBroker<AveragePrice>>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, snapshot: AggregateSnapshot) {
        let average = AveragePrice::from(snapshot);
        let record = OutboundRecord::keyed(AVERAGE_PRICE_KEY, average);
        if let Err(e) = self.broker.publish(&self.topic, record).await {
            warn!(
                topic = %self.topic,
                count = average.count,
                average = average.average,
                error = %e,
                "average price not published"
            );
        }
    }
}
