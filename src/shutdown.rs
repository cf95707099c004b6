use std::sync::Arc;

use tokio::signal;

use crate::server::AppState;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Resolves on a shutdown signal, after cancelling every in-flight batch so
/// open connections can drain quickly.
pub async fn shutdown_signal(state: Arc<AppState>) {
    wait_for_shutdown().await;
    cancel_in_flight(&state);
}

/// Cancel all batches started from this state.
pub fn cancel_in_flight(state: &AppState) {
    let busy = state.scheduler.limit() - state.scheduler.available_capacity();
    tracing::info!(running_items = busy, "Cancelling in-flight batches");
    state.shutdown.cancel();
}

/// Log what is left once the server has stopped accepting work.
pub fn graceful_shutdown(state: &AppState) {
    let busy = state.scheduler.limit() - state.scheduler.available_capacity();
    if busy == 0 {
        tracing::info!("No running items left");
    } else {
        tracing::warn!(running_items = busy, "Items still releasing capacity at exit");
    }
    tracing::info!("Graceful shutdown complete");
}
