//! Prometheus recorder installation.
//!
//! The recorder is installed once at startup; the rendered text format is
//! exposed by the intake server's `/metrics` route alongside the JSON
//! stats snapshot, so operators scrape the same port producers use.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Install the global Prometheus recorder and return the render handle.
pub fn init() -> Result<PrometheusHandle, MetricsError> {
    PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)
}
