//! Orderflow Server — retrying order consumer with dead-letter routing and a
//! concurrent price aggregate, served over HTTP.

pub mod aggregator;
pub mod app;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod network;
pub mod observability;
pub mod traits;
pub mod worker;

pub use aggregator::{Aggregator, AveragePublisher, StatsReader};
pub use app::{ConsumerGroup, OrderflowApp};
pub use config::{ConfigError, LogFormat, RetryPolicy, ServerConfig, SinkRetryPolicy};
pub use traits::{DeadLetterSink, EventBroker};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
