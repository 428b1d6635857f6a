//! Pipeline composition: wraps a processing service with all middleware layers.

use orderflow_core::{Order, ProcessingError};
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder};

use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::config::RetryPolicy;

/// Type-erased processing pipeline, cloned once per partition consumer.
pub type ProcessingPipeline = BoxCloneService<Order, f64, ProcessingError>;

/// Build the processing pipeline around `service`.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- span and duration for the whole attempt, timeouts included
/// 2. `TimeoutLayer` -- fail the attempt after `policy.processing_timeout`
#[must_use]
pub fn build_processing_pipeline<S>(service: S, policy: &RetryPolicy) -> ProcessingPipeline
where
    S: Service<Order, Response = f64, Error = ProcessingError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    let stack = ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(TimeoutLayer::new(policy.processing_timeout))
        .service(service);
    BoxCloneService::new(stack)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::consumer::processor::{OrderProcessor, ProcessingFuture};

    /// Service that never finishes.
    #[derive(Clone)]
    struct HangingService;

    impl Service<Order> for HangingService {
        type Response = f64;
        type Error = ProcessingError;
        type Future = ProcessingFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _order: Order) -> Self::Future {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn pipeline_runs_processor() {
        let pipeline = build_processing_pipeline(OrderProcessor, &RetryPolicy::default());
        let price = pipeline
            .oneshot(Order::new("a", "widget", 42.0))
            .await
            .unwrap();
        assert!((price - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_times_out_hanging_service() {
        let policy = RetryPolicy {
            processing_timeout: Duration::from_millis(20),
            ..RetryPolicy::default()
        };
        let pipeline = build_processing_pipeline(HangingService, &policy);
        let err = pipeline
            .oneshot(Order::new("a", "widget", 1.0))
            .await
            .unwrap_err();
        assert_eq!(err, ProcessingError::Timeout { timeout_ms: 20 });
    }

    #[tokio::test]
    async fn pipeline_is_cloneable_per_partition() {
        let pipeline = build_processing_pipeline(OrderProcessor, &RetryPolicy::default());
        let a = pipeline.clone();
        let b = pipeline;
        assert!(a.oneshot(Order::new("a", "x", 1.0)).await.is_ok());
        assert!(b.oneshot(Order::new("b", "y", 2.0)).await.is_ok());
    }
}
