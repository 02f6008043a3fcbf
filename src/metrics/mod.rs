//! Metrics and observability infrastructure for squall.
//!
//! This module groups the observability components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `recorder`: Prometheus recorder installation
//!
//! These Prometheus series are operational telemetry about the service
//! itself; the pipeline's own [`crate::collector::CollectorStats`] snapshot
//! is separate and served as JSON by the intake server.

pub mod events;
pub mod recorder;

pub use recorder::init;

/// Emit an internal event as a metric.
///
/// # Example
///
/// ```ignore
/// use squall::metrics::events::EventsReceived;
///
/// emit!(EventsReceived { count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
