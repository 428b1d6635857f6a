//! Dead-letter topic inspection.
//!
//! [`DeadLetterInspector`] runs on a [`BackgroundWorker`](crate::worker::BackgroundWorker),
//! fed with the records of the dead-letter topic. Each record is logged with
//! its diagnostic headers and kept in a bounded [`DeadLetterLog`] that the
//! HTTP read side serves.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use orderflow_core::{DeadLetterReason, Order, RecordOrigin};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use super::{
    HEADER_ATTEMPTS, HEADER_ERROR_CLASS, HEADER_ERROR_MESSAGE, HEADER_FAILED_AT_MS,
    HEADER_ORIGIN_OFFSET, HEADER_ORIGIN_PARTITION, HEADER_ORIGIN_TOPIC, HEADER_REASON,
};
use crate::broker::BrokerRecord;
use crate::worker::BackgroundRunnable;

// ---------------------------------------------------------------------------
// DeadLetterEntry
// ---------------------------------------------------------------------------

/// A dead-letter topic record as seen by the inspector.
///
/// Header-derived fields are `None` when the producer did not set them or set
/// an unparseable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub order: Order,
    /// Position in the dead-letter topic.
    pub position: RecordOrigin,
    /// Position of the original record.
    pub origin: Option<RecordOrigin>,
    pub attempts: Option<u32>,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub reason: Option<DeadLetterReason>,
    pub failed_at_ms: Option<u64>,
}

impl DeadLetterEntry {
    #[must_use]
    pub fn from_record(record: &BrokerRecord) -> Self {
        let headers = &record.headers;
        let origin = match (
            headers.get(HEADER_ORIGIN_TOPIC),
            parse_header(headers, HEADER_ORIGIN_PARTITION),
            parse_header(headers, HEADER_ORIGIN_OFFSET),
        ) {
            (Some(topic), Some(partition), Some(offset)) => Some(RecordOrigin {
                topic: topic.clone(),
                partition,
                offset,
            }),
            _ => None,
        };

        Self {
            order: record.payload.clone(),
            position: record.origin.clone(),
            origin,
            attempts: parse_header(headers, HEADER_ATTEMPTS),
            error_class: headers.get(HEADER_ERROR_CLASS).cloned(),
            error_message: headers.get(HEADER_ERROR_MESSAGE).cloned(),
            reason: parse_header(headers, HEADER_REASON),
            failed_at_ms: parse_header(headers, HEADER_FAILED_AT_MS),
        }
    }
}

fn parse_header<T>(headers: &BTreeMap<String, String>, name: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    headers.get(name).and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// DeadLetterLog
// ---------------------------------------------------------------------------

/// Bounded in-memory log of the most recent dead letters.
#[derive(Debug)]
pub struct DeadLetterLog {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    total_seen: AtomicU64,
}

/// Serializable view of the log for the HTTP read side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterView {
    /// Letters seen since startup, including evicted ones.
    pub total_seen: u64,
    /// Retained letters, oldest first.
    pub entries: Vec<DeadLetterEntry>,
}

impl DeadLetterLog {
    /// Creates a log retaining at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            total_seen: AtomicU64::new(0),
        }
    }

    /// Appends an entry, evicting the oldest when full.
    pub fn push(&self, entry: DeadLetterEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        self.total_seen.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn total_seen(&self) -> u64 {
        self.total_seen.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn view(&self) -> DeadLetterView {
        let entries = self.entries.lock();
        DeadLetterView {
            total_seen: self.total_seen(),
            entries: entries.iter().cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetterInspector
// ---------------------------------------------------------------------------

/// Background runnable that logs and retains dead-letter topic records.
pub struct DeadLetterInspector {
    log: Arc<DeadLetterLog>,
    since_last_tick: u64,
}

impl DeadLetterInspector {
    #[must_use]
    pub fn new(log: Arc<DeadLetterLog>) -> Self {
        Self {
            log,
            since_last_tick: 0,
        }
    }
}

#[async_trait]
impl BackgroundRunnable for DeadLetterInspector {
    type Task = BrokerRecord;

    async fn run(&mut self, record: BrokerRecord) {
        warn!(
            topic = %record.origin.topic,
            partition = record.origin.partition,
            offset = record.origin.offset,
            order_id = %record.payload.order_id,
            product = %record.payload.product,
            price = record.payload.price,
            headers = ?record.headers,
            "dead letter received"
        );
        self.log.push(DeadLetterEntry::from_record(&record));
        self.since_last_tick += 1;
    }

    async fn on_tick(&mut self) {
        if self.since_last_tick > 0 {
            info!(
                new = self.since_last_tick,
                total = self.log.total_seen(),
                retained = self.log.len(),
                "dead-letter summary"
            );
            self.since_last_tick = 0;
        }
    }

    async fn shutdown(&mut self) {
        info!(total = self.log.total_seen(), "dead-letter inspector stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use orderflow_core::{DeadLetter, FailureRecord, ProcessingError};

    use super::*;
    use crate::dead_letter::dead_letter_headers;
    use crate::worker::BackgroundWorker;

    fn dlq_record(id: &str, offset: u64) -> BrokerRecord {
        let letter = DeadLetter {
            order: Order::new(id, "fail_perm", 12.0),
            origin: RecordOrigin {
                topic: "orders".to_string(),
                partition: 1,
                offset: 40 + offset,
            },
            attempts: 1,
            error: FailureRecord::from(&ProcessingError::Rejected {
                reason: "permanent bad data".to_string(),
            }),
            reason: DeadLetterReason::Permanent,
            failed_at_ms: 5,
        };
        BrokerRecord {
            origin: RecordOrigin {
                topic: "orders-dlq".to_string(),
                partition: 0,
                offset,
            },
            key: id.to_string(),
            payload: letter.order.clone(),
            headers: dead_letter_headers(&letter),
        }
    }

    #[test]
    fn entry_parses_headers() {
        let entry = DeadLetterEntry::from_record(&dlq_record("o-1", 3));
        assert_eq!(entry.position.offset, 3);
        assert_eq!(entry.origin.unwrap().offset, 43);
        assert_eq!(entry.attempts, Some(1));
        assert_eq!(entry.error_class.as_deref(), Some("rejected"));
        assert_eq!(entry.reason, Some(DeadLetterReason::Permanent));
        assert_eq!(entry.failed_at_ms, Some(5));
    }

    #[test]
    fn entry_tolerates_missing_headers() {
        let mut record = dlq_record("o-1", 0);
        record.headers.clear();
        let entry = DeadLetterEntry::from_record(&record);
        assert!(entry.origin.is_none());
        assert!(entry.attempts.is_none());
        assert!(entry.reason.is_none());
    }

    #[test]
    fn log_evicts_oldest_beyond_capacity() {
        let log = DeadLetterLog::new(2);
        for i in 0..3 {
            log.push(DeadLetterEntry::from_record(&dlq_record(&format!("o-{i}"), i)));
        }

        let view = log.view();
        assert_eq!(view.total_seen, 3);
        let ids: Vec<_> = view
            .entries
            .iter()
            .map(|e| e.order.order_id.to_string())
            .collect();
        assert_eq!(ids, ["o-1", "o-2"]);
    }

    #[test]
    fn view_serializes_camel_case() {
        let log = DeadLetterLog::new(4);
        log.push(DeadLetterEntry::from_record(&dlq_record("o-1", 0)));
        let json = serde_json::to_value(log.view()).unwrap();
        assert_eq!(json["totalSeen"], 1);
        assert_eq!(json["entries"][0]["errorClass"], "rejected");
        assert_eq!(json["entries"][0]["order"]["orderId"], "o-1");
    }

    #[tokio::test]
    async fn inspector_worker_fills_log() {
        let log = Arc::new(DeadLetterLog::new(10));
        let mut worker =
            BackgroundWorker::start(DeadLetterInspector::new(log.clone()), Duration::from_secs(60));

        worker.submit(dlq_record("o-1", 0)).await.unwrap();
        worker.submit(dlq_record("o-2", 1)).await.unwrap();
        worker.stop().await;

        assert_eq!(log.len(), 2);
        assert_eq!(log.total_seen(), 2);
    }
}
