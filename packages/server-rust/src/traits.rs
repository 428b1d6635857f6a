//! Seams between the consumer and its external collaborators.

use async_trait::async_trait;
use orderflow_core::{DeadLetter, Order, RecordOrigin};

use crate::broker::{BrokerError, OutboundRecord};
use crate::dead_letter::SinkError;

/// Destination for orders that failed processing for good.
///
/// Implementations are expected to be durable and append-only. A returned
/// `Ok` is the sink's acknowledgement; the consumer does not treat the
/// originating record as handled before it (or before the local
/// retry-or-report policy gives up).
/// Implementations: broker dead-letter topic, memory (tests, inspection).
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Append one dead letter.
    async fn record(&self, letter: &DeadLetter) -> Result<(), SinkError>;
}

/// Publishing side of the message broker.
///
/// Transport, partitioning and persistence belong to the broker; the
/// consumer only needs to publish records to a named topic. `T` is the
/// record payload: orders unless stated otherwise.
#[async_trait]
pub trait EventBroker<T = Order>: Send + Sync
where
    T: Send + 'static,
{
    /// Publish a record and return where the broker placed it.
    async fn publish(
        &self,
        topic: &str,
        record: OutboundRecord<T>,
    ) -> Result<RecordOrigin, BrokerError>;
}
