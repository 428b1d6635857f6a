//! Retry envelopes and dead letters.
//!
//! A [`RetryEnvelope`] owns an order for the duration of its processing,
//! including any scheduled retries. When processing gives up the envelope is
//! turned into a [`DeadLetter`] carrying everything an operator needs to
//! inspect or replay the order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FailureRecord;
use crate::order::Order;

/// Where a record was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOrigin {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// An order plus its retry bookkeeping.
///
/// The attempt counter starts at 1 and only moves forward through
/// [`retry`](Self::retry), which consumes the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEnvelope {
    order: Order,
    origin: RecordOrigin,
    attempt: u32,
    last_error: Option<FailureRecord>,
}

impl RetryEnvelope {
    /// Wraps a freshly received order for its first attempt.
    #[must_use]
    pub fn new(order: Order, origin: RecordOrigin) -> Self {
        Self {
            order,
            origin,
            attempt: 1,
            last_error: None,
        }
    }

    #[must_use]
    pub fn order(&self) -> &Order {
        &self.order
    }

    #[must_use]
    pub fn origin(&self) -> &RecordOrigin {
        &self.origin
    }

    /// The 1-based number of the attempt this envelope is for.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The failure observed on the previous attempt, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&FailureRecord> {
        self.last_error.as_ref()
    }

    /// Prepares the envelope for the next attempt after `failure`.
    #[must_use]
    pub fn retry(self, failure: FailureRecord) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            last_error: Some(failure),
            ..self
        }
    }

    /// Converts the envelope into a dead letter for the failure observed on
    /// the current attempt.
    #[must_use]
    pub fn into_dead_letter(
        self,
        failure: FailureRecord,
        reason: DeadLetterReason,
        failed_at_ms: u64,
    ) -> DeadLetter {
        DeadLetter {
            order: self.order,
            origin: self.origin,
            attempts: self.attempt,
            error: failure,
            reason,
            failed_at_ms,
        }
    }
}

/// Why an order ended up in the dead-letter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The failure can never succeed on retry.
    Permanent,
    /// A retryable failure persisted through every allowed attempt.
    RetriesExhausted,
}

impl DeadLetterReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadLetterReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permanent" => Ok(Self::Permanent),
            "retries_exhausted" => Ok(Self::RetriesExhausted),
            other => Err(UnknownReason(other.to_string())),
        }
    }
}

/// A dead-letter reason label that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dead-letter reason: {0}")]
pub struct UnknownReason(pub String);

/// An order that failed processing, with full diagnostic context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub order: Order,
    pub origin: RecordOrigin,
    /// Attempt number on which processing gave up.
    pub attempts: u32,
    /// Failure observed on the final attempt.
    pub error: FailureRecord,
    pub reason: DeadLetterReason,
    /// Wall-clock time of the final failure, in Unix milliseconds.
    pub failed_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> RetryEnvelope {
        RetryEnvelope::new(
            Order::new("o-1", "widget", 10.0),
            RecordOrigin {
                topic: "orders".into(),
                partition: 2,
                offset: 17,
            },
        )
    }

    fn failure(class: &str) -> FailureRecord {
        FailureRecord {
            class: class.into(),
            message: format!("{class} happened"),
        }
    }

    #[test]
    fn first_attempt_has_no_error() {
        let env = envelope();
        assert_eq!(env.attempt(), 1);
        assert!(env.last_error().is_none());
    }

    #[test]
    fn retry_increments_attempt_and_keeps_identity() {
        let env = envelope().retry(failure("transient"));
        assert_eq!(env.attempt(), 2);
        assert_eq!(env.last_error().unwrap().class, "transient");
        assert_eq!(env.order().order_id.as_str(), "o-1");
        assert_eq!(env.origin().offset, 17);

        let env = env.retry(failure("timeout"));
        assert_eq!(env.attempt(), 3);
        assert_eq!(env.last_error().unwrap().class, "timeout");
    }

    #[test]
    fn dead_letter_carries_diagnostics() {
        let letter = envelope()
            .retry(failure("transient"))
            .into_dead_letter(failure("timeout"), DeadLetterReason::RetriesExhausted, 99);

        assert_eq!(letter.attempts, 2);
        assert_eq!(letter.error.class, "timeout");
        assert_eq!(letter.origin.topic, "orders");
        assert_eq!(letter.origin.partition, 2);
        assert_eq!(letter.reason, DeadLetterReason::RetriesExhausted);
        assert_eq!(letter.failed_at_ms, 99);
    }

    #[test]
    fn reason_parses_its_own_label() {
        for reason in [DeadLetterReason::Permanent, DeadLetterReason::RetriesExhausted] {
            assert_eq!(reason.as_str().parse::<DeadLetterReason>(), Ok(reason));
        }
        assert!("later".parse::<DeadLetterReason>().is_err());
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&DeadLetterReason::RetriesExhausted).unwrap();
        assert_eq!(json, "\"retries_exhausted\"");
    }
}
