//! Order consumption: classification, backoff, processing and the retry loop.
//!
//! - [`classify`]: retryable vs. permanent failures
//! - [`backoff`]: retry delay strategies
//! - [`processor`]: order business rules as a Tower service
//! - [`middleware`]: timeout and metrics layers around the processor
//! - [`retry`]: the per-partition retry state machine
//! - [`stats`]: process-wide counters

pub mod backoff;
pub mod classify;
pub mod middleware;
pub mod processor;
pub mod retry;
pub mod stats;

pub use backoff::{BackoffScheduler, ExponentialBackoff, FixedBackoff};
pub use classify::{DefaultClassifier, FailureClassifier, FailureKind};
pub use middleware::{build_processing_pipeline, ProcessingPipeline};
pub use processor::{process_order, OrderProcessor};
pub use retry::{
    ConsumerContext, ConsumerError, ConsumerState, ConsumerSummary, RetryConsumer, Transition,
};
pub use stats::{ConsumerStats, ConsumerStatsSnapshot};
