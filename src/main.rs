//! squall: high-throughput telemetry ingestion service.
//!
//! Accepts performance events over HTTP, batches them across a worker
//! pool, and persists them to TimescaleDB via COPY with a row-insert
//! fallback.

use clap::Parser;
use snafu::prelude::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use squall::collector::BatchCollector;
use squall::config::Config;
use squall::error::{
    BindSnafu, CollectorError, ConfigSnafu, MetricsSnafu, ServeSnafu, StorageSnafu,
};
use squall::http::{AllowedOrigins, AppState};
use squall::storage::PostgresStore;
use squall::{http, metrics, signal};

/// Ceiling on the drain after the HTTP server has stopped. A hung store
/// must not keep the process alive forever; past this point workers are
/// hard-cancelled and remaining events are abandoned.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Telemetry ingestion service.
#[derive(Parser, Debug)]
#[command(name = "squall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Defaults plus environment
    /// overrides apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without serving.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CollectorError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("squall starting");

    let config = load_config(&args)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Server: {}", config.server.address);
        info!("Workers: {}", config.collector.workers);
        info!("Batch size: {}", config.collector.batch_size);
        info!("Flush interval: {}ms", config.collector.flush_interval_ms);
        info!("Queue capacity: {}", config.collector.queue_capacity());
        info!("Configuration is valid");
        return Ok(());
    }

    let prometheus = if config.metrics.enabled {
        Some(metrics::init().context(MetricsSnafu)?)
    } else {
        None
    };

    // Fatal when the store is unreachable: never accept traffic that
    // cannot eventually be persisted.
    let store = Arc::new(
        PostgresStore::connect(&config.database)
            .await
            .context(StorageSnafu)?,
    );
    info!("connected to database");

    let collector = Arc::new(BatchCollector::new(config.collector.clone(), store.clone()));
    let cancel = CancellationToken::new();
    collector.start(cancel.clone());

    let state = Arc::new(AppState {
        collector: collector.clone(),
        store: store.clone(),
        origins: AllowedOrigins::new(&config.server.allowed_origins),
        prometheus,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .context(BindSnafu)?;
    info!("listening on {}", config.server.address);

    axum::serve(
        listener,
        http::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal::shutdown_signal())
    .await
    .context(ServeSnafu)?;

    // Producers are gone once the server has stopped; drain the pipeline.
    info!("shutting down...");
    if tokio::time::timeout(DRAIN_DEADLINE, collector.shutdown())
        .await
        .is_err()
    {
        warn!(
            deadline_secs = DRAIN_DEADLINE.as_secs(),
            "drain deadline exceeded, cancelling workers"
        );
        cancel.cancel();
    }
    store.close().await;

    info!("shutdown complete");
    Ok(())
}

/// Build configuration from arguments.
fn load_config(args: &Args) -> Result<Config, CollectorError> {
    match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu),
        None => Config::from_env().context(ConfigSnafu),
    }
}
