//! Storage sink for enriched telemetry events.
//!
//! The pipeline only depends on the [`EventStore`] trait; the Postgres
//! implementation lives in [`postgres`]. Keeping both write paths behind
//! one interface lets the worker's bulk-then-rows fallback policy stay
//! independent of the underlying store.

pub mod postgres;

pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::event::{EnrichedEvent, ServiceMetric};

/// Persistence contract consumed by the worker pool.
///
/// Implementations must be safe to call concurrently from multiple workers
/// with independent batches; any synchronization below this interface (for
/// example a connection pool) is the implementation's responsibility.
/// Both write paths either fully succeed or return a single error;
/// partial-batch success is not modeled.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Bulk-copy write path: streams the whole batch in one round trip.
    async fn write_bulk(&self, events: &[EnrichedEvent]) -> Result<(), StorageError>;

    /// Row-oriented fallback path: a single parameterized multi-row insert.
    async fn write_rows(&self, events: &[EnrichedEvent]) -> Result<(), StorageError>;

    /// Write backend service metrics directly. These arrive pre-batched
    /// from trusted internal clients and bypass the worker pipeline.
    async fn write_service_metrics(&self, metrics: &[ServiceMetric]) -> Result<(), StorageError>;

    /// Lightweight liveness probe, used by the readiness endpoint.
    async fn ping(&self) -> Result<(), StorageError>;
}
