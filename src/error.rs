//! Error types for squall using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase. Per-batch write failures are never
//! propagated through these types at runtime; workers absorb them into the
//! statistics counters and logs. Only startup failures are fatal.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Database URL is empty.
    #[snafu(display("Database URL cannot be empty"))]
    EmptyDatabaseUrl,

    /// Batch size must be non-zero.
    #[snafu(display("Batch size must be greater than zero"))]
    ZeroBatchSize,

    /// Worker count must be non-zero.
    #[snafu(display("Worker count must be greater than zero"))]
    ZeroWorkers,

    /// Flush interval must be non-zero.
    #[snafu(display("Flush interval must be greater than zero"))]
    ZeroFlushInterval,
}

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Failed to connect to the database.
    #[snafu(display("Failed to connect to database"))]
    Connect { source: sqlx::Error },

    /// Liveness probe failed.
    #[snafu(display("Database ping failed"))]
    Ping { source: sqlx::Error },

    /// Bulk COPY write failed.
    #[snafu(display("COPY write failed"))]
    Copy { source: sqlx::Error },

    /// Multi-row INSERT write failed.
    #[snafu(display("INSERT write failed"))]
    Insert { source: sqlx::Error },

    /// Write attempt exceeded the configured timeout.
    #[snafu(display("Write timed out after {millis}ms"))]
    WriteTimeout { millis: u64 },

    /// Failed to serialize event metadata.
    #[snafu(display("Failed to serialize event metadata"))]
    MetadataSerialize { source: serde_json::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Collector Error (top-level) ============

/// Top-level errors that aggregate all error types.
///
/// Returned from `main` and the service wiring; everything here is fatal at
/// startup. The pipeline itself converts runtime failures into counters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CollectorError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error"))]
    Storage { source: StorageError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Failed to bind the HTTP listener.
    #[snafu(display("Failed to bind HTTP listener"))]
    Bind { source: std::io::Error },

    /// HTTP server error.
    #[snafu(display("HTTP server error"))]
    Serve { source: std::io::Error },
}
