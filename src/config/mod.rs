//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with serde defaults, plus
//! environment overrides for the values that deployments inject as secrets.
//! All parameters are fixed at process start; nothing is mutated at runtime.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyDatabaseUrlSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu,
    ZeroFlushIntervalSnafu, ZeroWorkersSnafu,
};

/// Queue capacity is derived from the batch size rather than configured
/// independently: enough slack for every worker to be mid-flush while a
/// burst lands, without unbounded growth.
pub const QUEUE_CAPACITY_MULTIPLIER: usize = 10;

/// Main configuration structure for the service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP intake server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Batching pipeline configuration.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP intake server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the intake HTTP server (default: "0.0.0.0:8080").
    #[serde(default = "default_server_address")]
    pub address: String,

    /// Origins allowed to POST events from a browser. `*` allows all.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Database connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Overridden by `DATABASE_URL` if set.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pool connections (default: 20).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle pool connections (default: 5).
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Maximum connection lifetime in seconds (default: 3600).
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    /// Idle connection timeout in seconds (default: 1800).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Timeout for the startup connectivity check in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost:5432/squall?sslmode=disable".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_lifetime_secs() -> u64 {
    3600
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// Batching pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Events accumulated before a size-triggered flush (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum staleness of an unflushed batch in milliseconds (default: 5000).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Number of independent batching workers (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Ceiling on a single write-path attempt in milliseconds (default: 10000).
    /// Keeps a hung store from stalling a worker without bound.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            workers: default_workers(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_workers() -> usize {
    4
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

impl CollectorConfig {
    /// Capacity of the shared intake queue.
    pub fn queue_capacity(&self) -> usize {
        self.batch_size * QUEUE_CAPACITY_MULTIPLIER
    }

    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Per-attempt write timeout as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder and `/metrics` route are enabled
    /// (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        let mut config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from defaults and environment overrides only.
    ///
    /// Used when no config file is given; deployments that configure
    /// everything through the environment run this path.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for deployment-injected values.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if !port.is_empty() {
                self.server.address = format!("0.0.0.0:{port}");
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.database.url.is_empty(), EmptyDatabaseUrlSnafu);
        ensure!(self.collector.batch_size > 0, ZeroBatchSizeSnafu);
        ensure!(self.collector.workers > 0, ZeroWorkersSnafu);
        ensure!(self.collector.flush_interval_ms > 0, ZeroFlushIntervalSnafu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
server:
  address: "127.0.0.1:9000"
  allowed_origins:
    - "https://app.example.com"

database:
  url: "postgres://db:5432/telemetry"
  max_connections: 10

collector:
  batch_size: 250
  flush_interval_ms: 2000
  workers: 8
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:9000");
        assert_eq!(config.database.url, "postgres://db:5432/telemetry");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.collector.batch_size, 250);
        assert_eq!(config.collector.workers, 8);
        assert_eq!(config.collector.queue_capacity(), 2500);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.collector.batch_size, 100);
        assert_eq!(config.collector.flush_interval_ms, 5000);
        assert_eq!(config.collector.workers, 4);
        assert_eq!(config.collector.queue_capacity(), 1000);
        assert_eq!(config.database.max_connections, 20);
        assert!(config.metrics.enabled);
        assert_eq!(config.server.allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = Config::default();
        config.collector.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroWorkers { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_empty_url() {
        let mut config = Config::default();
        config.database.url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDatabaseUrl { .. })
        ));
    }

    #[test]
    fn test_flush_interval_duration() {
        let config = CollectorConfig {
            flush_interval_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.flush_interval(), Duration::from_millis(250));
    }
}
