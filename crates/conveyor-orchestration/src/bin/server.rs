//! # Conveyor Orchestration Server
//!
//! Thin wrapper binary: initializes logging, bootstraps the orchestration
//! system, waits for a shutdown signal, and stops cleanly with a timeout
//! so a wedged shutdown still exits.

use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use conveyor_orchestration::OrchestrationBootstrap;
use conveyor_shared::logging;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    info!("starting conveyor orchestration server");
    info!(version = env!("CARGO_PKG_VERSION"), debug = cfg!(debug_assertions), "build info");

    let handle = OrchestrationBootstrap::bootstrap()
        .await
        .map_err(|e| format!("failed to bootstrap orchestration: {e}"))?;

    info!(bind_addr = %handle.config.orchestration.http_bind_addr, "orchestration server started");
    info!("press Ctrl+C to shut down gracefully");

    shutdown_signal().await;
    info!("shutdown signal received, stopping orchestration server");

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.stop()).await {
        Ok(Ok(())) => info!("orchestration server stopped cleanly"),
        Ok(Err(e)) => error!(error = %e, "orchestration server stop reported an error"),
        Err(_) => error!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "graceful shutdown timed out, forcing exit"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
