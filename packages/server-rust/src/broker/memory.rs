//! In-memory partitioned broker.
//!
//! Each topic has a fixed number of partitions. A partition is a bounded
//! tokio mpsc channel plus an offset counter; records are routed by
//! `partition_for(key)`, so all deliveries of one key keep their order.
//! Subscribing hands out the partition receivers exactly once, which models a
//! single consumer group. One broker carries one payload type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use orderflow_core::{partition_for, Order, RecordOrigin};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use super::{BrokerError, BrokerRecord, OutboundRecord};
use crate::traits::EventBroker;

struct PartitionWriter<T> {
    next_offset: u64,
    tx: mpsc::Sender<BrokerRecord<T>>,
}

struct Topic<T> {
    name: String,
    // Async mutex: the offset must stay reserved across the (possibly
    // waiting) send so offsets arrive in order.
    writers: Vec<tokio::sync::Mutex<PartitionWriter<T>>>,
    receivers: Mutex<Option<Vec<mpsc::Receiver<BrokerRecord<T>>>>>,
}

impl<T> Topic<T> {
    fn partition_count(&self) -> u32 {
        u32::try_from(self.writers.len()).unwrap_or(u32::MAX)
    }
}

/// Partitioned topic broker backed by tokio channels, carrying `T` payloads.
pub struct InMemoryBroker<T = Order> {
    topics: RwLock<HashMap<String, Arc<Topic<T>>>>,
    partition_capacity: usize,
}

impl InMemoryBroker {
    /// Creates an order broker whose partitions buffer up to
    /// `partition_capacity` undelivered records before publishers wait.
    #[must_use]
    pub fn new(partition_capacity: usize) -> Self {
        Self::with_capacity(partition_capacity)
    }
}

impl<T> InMemoryBroker<T> {
    /// Creates a broker for `T` payloads; see [`InMemoryBroker::new`].
    #[must_use]
    pub fn with_capacity(partition_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            partition_capacity: partition_capacity.max(1),
        }
    }

    /// Creates a topic with `partitions` partitions.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::TopicExists` if the name is taken and
    /// `BrokerError::NoPartitions` if `partitions` is zero.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<(), BrokerError> {
        if partitions == 0 {
            return Err(BrokerError::NoPartitions {
                topic: name.to_string(),
            });
        }

        let mut topics = self.topics.write();
        if topics.contains_key(name) {
            return Err(BrokerError::TopicExists {
                topic: name.to_string(),
            });
        }

        let mut writers = Vec::with_capacity(partitions as usize);
        let mut receivers = Vec::with_capacity(partitions as usize);
        for _ in 0..partitions {
            let (tx, rx) = mpsc::channel(self.partition_capacity);
            writers.push(tokio::sync::Mutex::new(PartitionWriter { next_offset: 0, tx }));
            receivers.push(rx);
        }

        topics.insert(
            name.to_string(),
            Arc::new(Topic {
                name: name.to_string(),
                writers,
                receivers: Mutex::new(Some(receivers)),
            }),
        );
        debug!(topic = name, partitions, "topic created");
        Ok(())
    }

    /// Number of partitions of `topic`, if it exists.
    #[must_use]
    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        self.topics.read().get(topic).map(|t| t.partition_count())
    }

    /// Takes the per-partition receivers of `topic`, indexed by partition.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::UnknownTopic` for a missing topic and
    /// `BrokerError::AlreadySubscribed` on the second call.
    pub fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Vec<mpsc::Receiver<BrokerRecord<T>>>, BrokerError> {
        let topic = self.topic(topic)?;
        let receivers = topic.receivers.lock().take();
        receivers.ok_or_else(|| BrokerError::AlreadySubscribed {
            topic: topic.name.clone(),
        })
    }

    fn topic(&self, name: &str) -> Result<Arc<Topic<T>>, BrokerError> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic {
                topic: name.to_string(),
            })
    }
}

#[async_trait]
impl<T> EventBroker<T> for InMemoryBroker<T>
where
    T: Send + 'static,
{
    async fn publish(
        &self,
        topic: &str,
        record: OutboundRecord<T>,
    ) -> Result<RecordOrigin, BrokerError> {
        let topic = self.topic(topic)?;
        let partition = partition_for(&record.key, topic.partition_count());

        let mut writer = topic.writers[partition as usize].lock().await;
        let origin = RecordOrigin {
            topic: topic.name.clone(),
            partition,
            offset: writer.next_offset,
        };

        let delivered = BrokerRecord {
            origin: origin.clone(),
            key: record.key,
            payload: record.payload,
            headers: record.headers,
        };
        writer
            .tx
            .send(delivered)
            .await
            .map_err(|_| BrokerError::PartitionClosed {
                topic: topic.name.clone(),
                partition,
            })?;
        writer.next_offset += 1;

        debug!(
            topic = %origin.topic,
            partition = origin.partition,
            offset = origin.offset,
            "record published"
        );
        Ok(origin)
    }
}
