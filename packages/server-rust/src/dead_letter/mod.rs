//! Dead-letter channel: sinks, delivery policy and inspection.
//!
//! - [`TopicDeadLetterSink`]: publishes letters to the dead-letter topic with diagnostic headers
//! - [`MemoryDeadLetterSink`]: keeps letters in memory
//! - [`deliver_dead_letter`]: retry-or-report delivery used by the consumer
//! - [`inspector`]: background consumer of the dead-letter topic

pub mod inspector;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use orderflow_core::DeadLetter;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::broker::{BrokerError, OutboundRecord};
use crate::config::SinkRetryPolicy;
use crate::observability::SINK_FAILURES;
use crate::traits::{DeadLetterSink, EventBroker};

pub use inspector::{DeadLetterEntry, DeadLetterInspector, DeadLetterLog, DeadLetterView};

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

pub const HEADER_ORIGIN_TOPIC: &str = "x-origin-topic";
pub const HEADER_ORIGIN_PARTITION: &str = "x-origin-partition";
pub const HEADER_ORIGIN_OFFSET: &str = "x-origin-offset";
pub const HEADER_ATTEMPTS: &str = "x-attempts";
pub const HEADER_ERROR_CLASS: &str = "x-error-class";
pub const HEADER_ERROR_MESSAGE: &str = "x-error-message";
pub const HEADER_REASON: &str = "x-dead-letter-reason";
pub const HEADER_FAILED_AT_MS: &str = "x-failed-at-ms";

/// Diagnostic headers attached to a dead letter on the dead-letter topic.
#[must_use]
pub fn dead_letter_headers(letter: &DeadLetter) -> BTreeMap<String, String> {
    BTreeMap::from([
        (HEADER_ORIGIN_TOPIC.to_string(), letter.origin.topic.clone()),
        (
            HEADER_ORIGIN_PARTITION.to_string(),
            letter.origin.partition.to_string(),
        ),
        (HEADER_ORIGIN_OFFSET.to_string(), letter.origin.offset.to_string()),
        (HEADER_ATTEMPTS.to_string(), letter.attempts.to_string()),
        (HEADER_ERROR_CLASS.to_string(), letter.error.class.clone()),
        (HEADER_ERROR_MESSAGE.to_string(), letter.error.message.clone()),
        (HEADER_REASON.to_string(), letter.reason.as_str().to_string()),
        (HEADER_FAILED_AT_MS.to_string(), letter.failed_at_ms.to_string()),
    ])
}

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Failure to append a dead letter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("dead-letter sink unavailable: {0}")]
    Unavailable(String),
    #[error("dead-letter sink closed")]
    Closed,
}

impl From<BrokerError> for SinkError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::PartitionClosed { .. } => Self::Closed,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// TopicDeadLetterSink
// ---------------------------------------------------------------------------

/// Publishes dead letters to a broker topic.
///
/// The order is published unchanged, keyed by its id; failure details travel
/// in the headers listed in [`dead_letter_headers`].
pub struct TopicDeadLetterSink {
    broker: Arc<dyn EventBroker>,
    topic: String,
}

impl TopicDeadLetterSink {
    #[must_use]
    pub fn new(broker: Arc<dyn EventBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for TopicDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<(), SinkError> {
        let mut record = OutboundRecord::for_order(letter.order.clone());
        record.headers = dead_letter_headers(letter);
        self.broker.publish(&self.topic, record).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDeadLetterSink
// ---------------------------------------------------------------------------

/// Keeps dead letters in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every letter recorded so far.
    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<(), SinkError> {
        self.letters.lock().push(letter.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retry-or-report delivery
// ---------------------------------------------------------------------------

/// How a dead letter left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink acknowledged the letter.
    Recorded,
    /// Every sink attempt failed; the letter was logged in full instead.
    Reported,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Reported => "reported",
        }
    }
}

/// Hands `letter` to `sink`, retrying failed writes per `policy`.
///
/// When every attempt fails the whole letter is written to the error log so
/// the order is never dropped silently.
pub async fn deliver_dead_letter(
    sink: &dyn DeadLetterSink,
    letter: &DeadLetter,
    policy: &SinkRetryPolicy,
) -> DeliveryOutcome {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for sink_attempt in 1..=attempts {
        match sink.record(letter).await {
            Ok(()) => return DeliveryOutcome::Recorded,
            Err(err) => {
                metrics::counter!(SINK_FAILURES).increment(1);
                warn!(
                    order_id = %letter.order.order_id,
                    sink_attempt,
                    error = %err,
                    "dead-letter sink write failed"
                );
                last_error = Some(err);
                if sink_attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    let payload = serde_json::to_string(letter).unwrap_or_else(|_| format!("{letter:?}"));
    error!(
        order_id = %letter.order.order_id,
        error = ?last_error,
        letter = %payload,
        "dead letter could not be recorded; reporting instead"
    );
    DeliveryOutcome::Reported
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
