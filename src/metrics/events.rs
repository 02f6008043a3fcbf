//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which records the
//! corresponding Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when events are accepted at the intake boundary.
pub struct EventsReceived {
    pub count: u64,
}

impl InternalEvent for EventsReceived {
    fn emit(self) {
        trace!(count = self.count, "Events received");
        counter!("squall_events_received_total").increment(self.count);
    }
}

/// Event emitted when the intake queue rejects an event.
pub struct EventDropped;

impl InternalEvent for EventDropped {
    fn emit(self) {
        trace!("Event dropped, queue full");
        counter!("squall_events_dropped_total").increment(1);
    }
}

/// Outcome of a batch flush.
#[derive(Debug, Clone, Copy)]
pub enum FlushOutcome {
    /// Bulk COPY path succeeded.
    Bulk,
    /// COPY failed but the row-insert fallback succeeded.
    Fallback,
    /// Both write paths failed; the batch was lost.
    Failed,
}

impl FlushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushOutcome::Bulk => "bulk",
            FlushOutcome::Fallback => "fallback",
            FlushOutcome::Failed => "failed",
        }
    }
}

/// Event emitted when a worker completes a flush attempt.
pub struct BatchFlushed {
    pub outcome: FlushOutcome,
    pub size: usize,
}

impl InternalEvent for BatchFlushed {
    fn emit(self) {
        trace!(
            outcome = self.outcome.as_str(),
            size = self.size,
            "Batch flushed"
        );
        counter!("squall_batches_flushed_total", "outcome" => self.outcome.as_str()).increment(1);
        counter!("squall_flushed_events_total", "outcome" => self.outcome.as_str())
            .increment(self.size as u64);
    }
}

/// Event emitted with the duration of a flush, regardless of outcome.
pub struct FlushCompleted {
    pub duration: Duration,
}

impl InternalEvent for FlushCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Flush completed");
        histogram!("squall_flush_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the intake queue depth changes.
pub struct QueueDepth {
    pub depth: usize,
}

impl InternalEvent for QueueDepth {
    fn emit(self) {
        trace!(depth = self.depth, "Queue depth");
        gauge!("squall_queue_depth").set(self.depth as f64);
    }
}
