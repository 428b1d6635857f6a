//! Broker-facing record types and an in-memory partitioned broker.
//!
//! Records carry orders by default; the average-price topic carries
//! [`AveragePrice`](orderflow_core::AveragePrice) payloads.
//!
//! - [`memory`]: [`InMemoryBroker`], a partitioned topic broker over tokio channels
//! - [`replay`]: publishes JSON-lines order files, standing in for retained history

pub mod memory;
pub mod replay;

use std::collections::BTreeMap;

use orderflow_core::{Order, RecordOrigin};

pub use memory::InMemoryBroker;
pub use replay::{replay_json_lines, ReplayReport};

/// A record as delivered to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord<T = Order> {
    pub origin: RecordOrigin,
    pub key: String,
    pub payload: T,
    pub headers: BTreeMap<String, String>,
}

/// A record handed to the broker for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord<T = Order> {
    pub key: String,
    pub payload: T,
    pub headers: BTreeMap<String, String>,
}

impl OutboundRecord {
    /// Record keyed by the order id, without headers.
    #[must_use]
    pub fn for_order(order: Order) -> Self {
        Self::keyed(order.order_id.to_string(), order)
    }
}

impl<T> OutboundRecord<T> {
    #[must_use]
    pub fn keyed(key: impl Into<String>, payload: T) -> Self {
        Self {
            key: key.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Errors from publishing to or subscribing on the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unknown topic: {topic}")]
    UnknownTopic { topic: String },
    #[error("topic already exists: {topic}")]
    TopicExists { topic: String },
    #[error("topic {topic} must have at least one partition")]
    NoPartitions { topic: String },
    #[error("topic {topic} already has a subscriber")]
    AlreadySubscribed { topic: String },
    #[error("partition {partition} of topic {topic} is closed")]
    PartitionClosed { topic: String, partition: u32 },
}
