//! Server configuration.
//!
//! Every field can be set by a long flag or an `ORDERFLOW_*` environment
//! variable. Values are read once at startup; the consumer treats the derived
//! policies as read-only.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use orderflow_core::DEFAULT_PARTITION_COUNT;

use crate::network::NetworkConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Top-level configuration for the order processing server.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "orderflow", version, about = "Retrying order consumer with price aggregation")]
pub struct ServerConfig {
    /// Unique identifier for this node, attached to log lines.
    #[arg(long, env = "ORDERFLOW_NODE_ID", default_value = "orderflow-1")]
    pub node_id: String,
    /// Topic carrying incoming orders.
    #[arg(long, env = "ORDERFLOW_ORDERS_TOPIC", default_value = "orders")]
    pub orders_topic: String,
    /// Topic receiving dead-lettered orders.
    #[arg(long, env = "ORDERFLOW_DEAD_LETTER_TOPIC", default_value = "orders-dlq")]
    pub dead_letter_topic: String,
    /// Topic receiving the running average after every processed order.
    #[arg(long, env = "ORDERFLOW_AVG_PRICES_TOPIC", default_value = "average-prices")]
    pub avg_prices_topic: String,
    /// Partitions of the orders topic; one consumer runs per partition.
    #[arg(long, env = "ORDERFLOW_PARTITIONS", default_value_t = DEFAULT_PARTITION_COUNT)]
    pub partitions: u32,
    /// Buffered records per partition before publishers wait.
    #[arg(long, env = "ORDERFLOW_PARTITION_CAPACITY", default_value_t = 1024)]
    pub partition_capacity: usize,
    /// Total processing attempts per order, including the first.
    #[arg(long, env = "ORDERFLOW_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[arg(long, env = "ORDERFLOW_BACKOFF_BASE_MS", default_value_t = 1000)]
    pub backoff_base_ms: u64,
    /// Factor applied to the delay for each further retry.
    #[arg(long, env = "ORDERFLOW_BACKOFF_MULTIPLIER", default_value_t = 2.0)]
    pub backoff_multiplier: f64,
    /// Upper bound on any single retry delay, in milliseconds.
    #[arg(long, env = "ORDERFLOW_BACKOFF_MAX_MS", default_value_t = 30_000)]
    pub backoff_max_ms: u64,
    /// Randomize retry delays (never below the plain exponential value).
    #[arg(long, env = "ORDERFLOW_BACKOFF_JITTER")]
    pub backoff_jitter: bool,
    /// Per-attempt processing timeout, in milliseconds.
    #[arg(long, env = "ORDERFLOW_PROCESSING_TIMEOUT_MS", default_value_t = 5000)]
    pub processing_timeout_ms: u64,
    /// Attempts at writing one dead letter before reporting it.
    #[arg(long, env = "ORDERFLOW_SINK_RETRY_ATTEMPTS", default_value_t = 3)]
    pub sink_retry_attempts: u32,
    /// Pause between dead-letter write attempts, in milliseconds.
    #[arg(long, env = "ORDERFLOW_SINK_RETRY_DELAY_MS", default_value_t = 100)]
    pub sink_retry_delay_ms: u64,
    /// Dead letters kept for inspection over HTTP.
    #[arg(long, env = "ORDERFLOW_DEAD_LETTER_LOG_CAPACITY", default_value_t = 1000)]
    pub dead_letter_log_capacity: usize,
    /// Interval of the dead-letter summary log, in milliseconds.
    #[arg(long, env = "ORDERFLOW_INSPECTOR_TICK_MS", default_value_t = 60_000)]
    pub inspector_tick_ms: u64,
    /// HTTP bind address.
    #[arg(long, env = "ORDERFLOW_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// HTTP port. 0 means OS-assigned.
    #[arg(long, env = "ORDERFLOW_PORT", default_value_t = 8081)]
    pub port: u16,
    /// Maximum wait for in-flight orders on shutdown, in seconds.
    #[arg(long, env = "ORDERFLOW_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "ORDERFLOW_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Log output format.
    #[arg(long, env = "ORDERFLOW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
    /// JSON-lines file of orders to publish at startup.
    #[arg(long, env = "ORDERFLOW_REPLAY")]
    pub replay: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: "orderflow-1".to_string(),
            orders_topic: "orders".to_string(),
            dead_letter_topic: "orders-dlq".to_string(),
            avg_prices_topic: "average-prices".to_string(),
            partitions: DEFAULT_PARTITION_COUNT,
            partition_capacity: 1024,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_multiplier: 2.0,
            backoff_max_ms: 30_000,
            backoff_jitter: false,
            processing_timeout_ms: 5000,
            sink_retry_attempts: 3,
            sink_retry_delay_ms: 100,
            dead_letter_log_capacity: 1000,
            inspector_tick_ms: 60_000,
            host: "0.0.0.0".to_string(),
            port: 8081,
            drain_timeout_secs: 30,
            metrics_addr: None,
            log_format: LogFormat::Pretty,
            replay: None,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("partitions must be at least 1")]
    ZeroPartitions,
    #[error("partition_capacity must be at least 1")]
    ZeroCapacity,
    #[error("backoff_multiplier must be a finite number >= 1.0 (got {0})")]
    InvalidMultiplier(f64),
    #[error("orders and dead-letter topics must differ (both are {0:?})")]
    SameTopic(String),
}

impl ServerConfig {
    /// Checks values the consumer cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first offending setting as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.partitions == 0 {
            return Err(ConfigError::ZeroPartitions);
        }
        if self.partition_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.orders_topic == self.dead_letter_topic {
            return Err(ConfigError::SameTopic(self.orders_topic.clone()));
        }
        Ok(())
    }

    /// Retry behaviour of the consumer.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.backoff_max_ms),
            jitter: self.backoff_jitter,
            processing_timeout: Duration::from_millis(self.processing_timeout_ms),
        }
    }

    /// Retry behaviour for writes to the dead-letter sink.
    #[must_use]
    pub fn sink_retry_policy(&self) -> SinkRetryPolicy {
        SinkRetryPolicy {
            attempts: self.sink_retry_attempts.max(1),
            delay: Duration::from_millis(self.sink_retry_delay_ms),
        }
    }

    /// HTTP read-side configuration.
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        }
    }
}

/// Consumer retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per order, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Timeout applied to each processing attempt.
    pub processing_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ServerConfig::default().retry_policy()
    }
}

/// Local retry policy for dead-letter sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkRetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for SinkRetryPolicy {
    fn default() -> Self {
        ServerConfig::default().sink_retry_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = ServerConfig::default();
        assert_eq!(config.orders_topic, "orders");
        assert_eq!(config.dead_letter_topic, "orders-dlq");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_ms, 1000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(!config.backoff_jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parsed_defaults_equal_default_impl() {
        let parsed = ServerConfig::try_parse_from(["orderflow"]).unwrap();
        assert_eq!(parsed, ServerConfig::default());
        assert_eq!(parsed.avg_prices_topic, "average-prices");
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = ServerConfig::try_parse_from([
            "orderflow",
            "--max-attempts",
            "5",
            "--backoff-multiplier",
            "3.0",
            "--backoff-jitter",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(parsed.max_attempts, 5);
        assert!((parsed.backoff_multiplier - 3.0).abs() < f64::EPSILON);
        assert!(parsed.backoff_jitter);
        assert_eq!(parsed.log_format, LogFormat::Json);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero_attempts = ServerConfig {
            max_attempts: 0,
            ..ServerConfig::default()
        };
        assert_eq!(zero_attempts.validate(), Err(ConfigError::ZeroAttempts));

        let zero_partitions = ServerConfig {
            partitions: 0,
            ..ServerConfig::default()
        };
        assert_eq!(zero_partitions.validate(), Err(ConfigError::ZeroPartitions));

        let shrinking = ServerConfig {
            backoff_multiplier: 0.5,
            ..ServerConfig::default()
        };
        assert!(matches!(
            shrinking.validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));

        let nan = ServerConfig {
            backoff_multiplier: f64::NAN,
            ..ServerConfig::default()
        };
        assert!(matches!(nan.validate(), Err(ConfigError::InvalidMultiplier(_))));

        let same = ServerConfig {
            dead_letter_topic: "orders".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(same.validate(), Err(ConfigError::SameTopic("orders".into())));
    }

    #[test]
    fn derived_policies() {
        let config = ServerConfig {
            backoff_base_ms: 250,
            sink_retry_attempts: 0,
            ..ServerConfig::default()
        };
        let retry = config.retry_policy();
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
        assert_eq!(retry.processing_timeout, Duration::from_secs(5));

        // At least one sink write is always attempted.
        assert_eq!(config.sink_retry_policy().attempts, 1);
    }

    #[test]
    fn network_config_uses_host_and_port() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        let net = config.network_config();
        assert_eq!(net.host, "127.0.0.1");
        assert_eq!(net.port, 9000);
        assert_eq!(net.drain_timeout, Duration::from_secs(30));
    }
}
