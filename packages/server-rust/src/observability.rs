//! Tracing subscriber setup and metric names.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Counter: orders that reached the aggregate.
pub const ORDERS_PROCESSED: &str = "orderflow_orders_processed_total";
/// Counter: retries scheduled.
pub const ORDERS_RETRIED: &str = "orderflow_orders_retried_total";
/// Counter: orders routed to the dead-letter channel, labelled by `reason`.
pub const ORDERS_DEAD_LETTERED: &str = "orderflow_orders_dead_lettered_total";
/// Counter: dead-letter sink writes that failed.
pub const SINK_FAILURES: &str = "orderflow_dead_letter_sink_failures_total";
/// Histogram: duration of one processing attempt, in seconds.
pub const PROCESSING_DURATION: &str = "orderflow_processing_duration_seconds";

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Calling this
/// more than once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // Ignore the error: a subscriber may already be installed (tests, embedding).
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Installs the Prometheus recorder and serves `/metrics` on `addr`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be started.
pub fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_does_not_panic() {
        init_tracing(LogFormat::Pretty);
        init_tracing(LogFormat::Json);
    }
}
