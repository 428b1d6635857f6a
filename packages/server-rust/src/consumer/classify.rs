//! Failure classification: decides whether a failed attempt may be retried.

use orderflow_core::ProcessingError;

/// Outcome of classifying a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed on a later attempt; retry with backoff.
    Retryable,
    /// Will never succeed; dead-letter immediately.
    Permanent,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
        }
    }
}

/// Maps a processing failure to a [`FailureKind`].
///
/// Must be pure and deterministic: the consumer consults it once per failed
/// attempt and relies on it never panicking.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &ProcessingError) -> FailureKind;
}

/// Business-rule violations are permanent; everything else is retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, error: &ProcessingError) -> FailureKind {
        if error.is_business_rule() {
            FailureKind::Permanent
        } else {
            FailureKind::Retryable
        }
    }
}

impl<F> FailureClassifier for F
where
    F: Fn(&ProcessingError) -> FailureKind + Send + Sync,
{
    fn classify(&self, error: &ProcessingError) -> FailureKind {
        self(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_errors_are_permanent() {
        let c = DefaultClassifier;
        assert_eq!(
            c.classify(&ProcessingError::InvalidPrice { price: -5.0 }),
            FailureKind::Permanent
        );
        assert_eq!(
            c.classify(&ProcessingError::UnrecognizedProduct {
                product: String::new()
            }),
            FailureKind::Permanent
        );
        assert_eq!(
            c.classify(&ProcessingError::Rejected {
                reason: "bad data".into()
            }),
            FailureKind::Permanent
        );
    }

    #[test]
    fn runtime_errors_are_retryable() {
        let c = DefaultClassifier;
        assert_eq!(
            c.classify(&ProcessingError::Transient {
                reason: "flaky".into()
            }),
            FailureKind::Retryable
        );
        assert_eq!(
            c.classify(&ProcessingError::Timeout { timeout_ms: 5 }),
            FailureKind::Retryable
        );
        assert_eq!(
            c.classify(&ProcessingError::Unavailable {
                dependency: "pricing".into()
            }),
            FailureKind::Retryable
        );
        assert_eq!(
            c.classify(&ProcessingError::Internal("boom".into())),
            FailureKind::Retryable
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let c = DefaultClassifier;
        let err = ProcessingError::Timeout { timeout_ms: 1 };
        assert_eq!(c.classify(&err), c.classify(&err));
    }

    #[test]
    fn closures_are_classifiers() {
        let everything_permanent = |_: &ProcessingError| FailureKind::Permanent;
        assert_eq!(
            everything_permanent.classify(&ProcessingError::Timeout { timeout_ms: 1 }),
            FailureKind::Permanent
        );
    }
}
