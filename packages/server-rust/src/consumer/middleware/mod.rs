//! Tower middleware layers for the processing pipeline.
//!
//! - [`timeout`]: Per-attempt timeout enforcement
//! - [`metrics`]: Attempt timing and outcome via `tracing` spans and `metrics`
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use self::metrics::MetricsLayer;
pub use pipeline::{build_processing_pipeline, ProcessingPipeline};
pub use timeout::TimeoutLayer;
