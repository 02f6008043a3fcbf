//! Signal handling for graceful shutdown.

use tracing::info;

/// Wait for a termination signal (SIGINT or SIGTERM on Unix).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!(signal = "SIGINT", "Signal received"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "Signal received"),
    }
}

/// Wait for ctrl-c on non-Unix platforms.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(signal = "ctrl-c", "Signal received");
}
