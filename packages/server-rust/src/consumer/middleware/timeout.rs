//! Timeout middleware for order processing.
//!
//! Fails attempts that exceed the configured duration with
//! `ProcessingError::Timeout`, which the default classifier retries.

use std::task::{Context, Poll};
use std::time::Duration;

use orderflow_core::{Order, ProcessingError};
use tower::{Layer, Service};

use crate::consumer::processor::ProcessingFuture;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds each processing attempt.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces the per-attempt timeout.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Order> for TimeoutService<S>
where
    S: Service<Order, Response = f64, Error = ProcessingError> + Send,
    S::Future: Send + 'static,
{
    type Response = f64;
    type Error = ProcessingError;
    type Future = ProcessingFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, order: Order) -> Self::Future {
        let timeout = self.timeout;
        let fut = self.inner.call(order);
        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ProcessingError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    #[derive(Clone)]
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<Order> for SlowService {
        type Response = f64;
        type Error = ProcessingError;
        type Future = ProcessingFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, order: Order) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(order.price)
            })
        }
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc =
            TimeoutLayer::new(Duration::from_millis(1000)).layer(SlowService { delay_ms: 10 });
        let price = svc.oneshot(Order::new("a", "widget", 4.0)).await.unwrap();
        assert!((price - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer::new(Duration::from_millis(50)).layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(Order::new("a", "widget", 4.0)).await.unwrap_err();
        assert_eq!(err, ProcessingError::Timeout { timeout_ms: 50 });
    }
}
