//! Retry delay computation.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Computes how long to wait before retrying after a failed attempt.
///
/// `attempt` is the 1-based number of the attempt that just failed.
/// Implementations must be monotonically non-decreasing in `attempt`.
pub trait BackoffScheduler: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// `base * multiplier^(attempt - 1)`, capped at `max_delay`.
///
/// With jitter enabled a random amount is added, bounded by the gap to the
/// next step, so delays stay monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Uncapped exponential backoff without jitter.
    ///
    /// A multiplier below 1.0 (or NaN) is raised to 1.0.
    #[must_use]
    pub fn new(base: Duration, multiplier: f64) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1.0),
            max_delay: Duration::MAX,
            jitter: false,
        }
    }

    #[must_use]
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.base_delay, policy.multiplier)
            .with_max_delay(policy.max_delay)
            .with_jitter(policy.jitter)
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay for `attempt` without jitter.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let nanos = self.base.as_nanos() as f64 * self.multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_delay.as_nanos() as f64;
        // Overflowing to infinity lands on the cap as well.
        if nanos >= cap {
            return self.max_delay;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = nanos as u64;
        Duration::from_nanos(nanos)
    }
}

impl BackoffScheduler for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter {
            return delay;
        }
        let next = self.base_delay_for(attempt.saturating_add(1));
        let gap = next.saturating_sub(delay);
        if gap.is_zero() {
            return delay;
        }
        let fraction: f64 = rand::rng().random_range(0.0..1.0);
        delay + gap.mul_f64(fraction)
    }
}

/// Same delay for every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl BackoffScheduler for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}
