//! pixhaven server entry point
//!
//! Builds in-memory collaborators from the environment and runs the
//! background jobs until Ctrl-C. Production deployments wire real stores
//! through `AppState::new`.

use std::sync::Arc;

use pixhaven_server::jobs::{
    expiry_sweep_task, reclamation_worker_task, ExpirySweepConfig, ReclamationWorkerConfig,
};
use pixhaven_server::telemetry::{init_tracing, TelemetryConfig};
use pixhaven_server::{ApiError, ApiResult, AppState, ServerConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let state = Arc::new(AppState::in_memory(ServerConfig::from_env())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = state.queue.clone().map(|queue| {
        tokio::spawn(reclamation_worker_task(
            queue,
            state.blobs.clone(),
            ReclamationWorkerConfig::from_env(),
            shutdown_rx.clone(),
        ))
    });
    let sweep = tokio::spawn(expiry_sweep_task(
        state.clone(),
        ExpirySweepConfig::from_env(),
        shutdown_rx,
    ));

    tracing::info!(
        reclamation_mode = %state.config.reclamation_mode,
        "pixhaven server running"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to listen for Ctrl-C: {}", e)))?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Some(worker) = worker {
        match worker.await {
            Ok(metrics) => {
                let snapshot = metrics.snapshot();
                tracing::info!(
                    tasks_acked = snapshot.tasks_acked,
                    tasks_dead_lettered = snapshot.tasks_dead_lettered,
                    "Reclamation worker stopped"
                );
            }
            Err(e) => tracing::error!(error = %e, "Reclamation worker panicked"),
        }
    }
    if let Err(e) = sweep.await {
        tracing::error!(error = %e, "Expiry sweep panicked");
    }

    Ok(())
}
