//! Failure taxonomy for order processing.

use serde::{Deserialize, Serialize};

/// Failure raised while processing a single order.
///
/// Variants fall into two groups. Business-rule violations
/// ([`is_business_rule`](Self::is_business_rule) returns `true`) can never
/// succeed on a later attempt. All others describe the environment and may
/// clear up on their own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    #[error("invalid price: {price}")]
    InvalidPrice { price: f64 },
    #[error("unrecognized product: {product:?}")]
    UnrecognizedProduct { product: String },
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("transient processing failure: {reason}")]
    Transient { reason: String },
    #[error("processing timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("dependency unavailable: {dependency}")]
    Unavailable { dependency: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcessingError {
    /// Stable short name of the variant, used in logs, metrics labels and
    /// dead-letter headers.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidPrice { .. } => "invalid_price",
            Self::UnrecognizedProduct { .. } => "unrecognized_product",
            Self::Rejected { .. } => "rejected",
            Self::Transient { .. } => "transient",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the error is tagged as a business-rule violation.
    #[must_use]
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrice { .. } | Self::UnrecognizedProduct { .. } | Self::Rejected { .. }
        )
    }
}

/// Serializable summary of a failed attempt, carried on retry envelopes and
/// dead letters for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub class: String,
    pub message: String,
}

impl From<&ProcessingError> for FailureRecord {
    fn from(err: &ProcessingError) -> Self {
        Self {
            class: err.class().to_string(),
            message: err.to_string(),
        }
    }
}
