//! Metrics middleware for order processing.
//!
//! Runs each attempt inside a `process_order` span and records its duration
//! in the processing histogram, labelled by outcome.

use std::task::{Context, Poll};
use std::time::Instant;

use orderflow_core::{Order, ProcessingError};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::consumer::processor::ProcessingFuture;
use crate::observability::PROCESSING_DURATION;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments processing attempts.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records attempt duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Order> for MetricsService<S>
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
        let span = info_span!(
            "process_order",
            order_id = %order.order_id,
            product = %order.product,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(order);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.class(),
                };

                let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);
                metrics::histogram!(PROCESSING_DURATION, "outcome" => outcome)
                    .record(elapsed.as_secs_f64());

                tracing::debug!(duration_ms, outcome, "processing attempt complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::consumer::processor::OrderProcessor;

    #[tokio::test]
    async fn passes_through_success() {
        let svc = MetricsLayer.layer(OrderProcessor);
        let price = svc.oneshot(Order::new("a", "widget", 9.5)).await.unwrap();
        assert!((price - 9.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn passes_through_errors_unchanged() {
        let svc = MetricsLayer.layer(OrderProcessor);
        let err = svc
            .oneshot(Order::new("a", "fail_perm", 9.5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Rejected { .. }));
    }
}
