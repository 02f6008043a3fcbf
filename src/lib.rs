//! squall: a high-throughput telemetry ingestion service.
//!
//! Accepts bursty batches of performance events from untrusted producers,
//! buffers them in a bounded queue, accumulates batches across a worker
//! pool, and persists them to a TimescaleDB-backed time-series store using
//! COPY with a multi-row INSERT fallback.
//!
//! # Example
//!
//! ```ignore
//! use squall::{Config, collector::BatchCollector, storage::PostgresStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), squall::error::CollectorError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let store = Arc::new(PostgresStore::connect(&config.database).await?);
//!     let collector = Arc::new(BatchCollector::new(config.collector.clone(), store));
//!     collector.start(CancellationToken::new());
//!     // ... hand events to collector.push() ...
//!     collector.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod metrics;
pub mod signal;
pub mod storage;

// Re-export main types
pub use collector::{BatchCollector, CollectorStats};
pub use config::Config;
pub use event::{EnrichedEvent, RawEvent};
pub use storage::EventStore;
