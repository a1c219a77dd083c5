//! Expiry Sweep Background Task
//!
//! Deletes images whose expiry has passed, through the same delete path as a
//! user request: metadata, purge, then reclamation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::env_or;
use crate::constants::{DEFAULT_EXPIRY_SWEEP_BATCH_SIZE, DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS};
use crate::services::sweep_expired;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirySweepConfig {
    /// How often to sweep (default: hourly)
    pub interval: Duration,
    /// Expired images deleted per cycle (default: 100)
    pub batch_size: usize,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS),
            batch_size: DEFAULT_EXPIRY_SWEEP_BATCH_SIZE,
        }
    }
}

impl ExpirySweepConfig {
    /// # Environment Variables
    /// - `PIXHAVEN_EXPIRY_SWEEP_INTERVAL_SECS` (default: 3600)
    /// - `PIXHAVEN_EXPIRY_SWEEP_BATCH_SIZE` (default: 100)
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_or(
                "PIXHAVEN_EXPIRY_SWEEP_INTERVAL_SECS",
                DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS,
            )),
            batch_size: env_or(
                "PIXHAVEN_EXPIRY_SWEEP_BATCH_SIZE",
                DEFAULT_EXPIRY_SWEEP_BATCH_SIZE,
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExpirySweepMetrics {
    pub images_deleted: AtomicU64,
    pub delete_failures: AtomicU64,
    pub sweep_cycles: AtomicU64,
    pub sweep_errors: AtomicU64,
}

impl ExpirySweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sweep on `config.interval` until the shutdown signal flips to true.
pub async fn expiry_sweep_task(
    state: Arc<AppState>,
    config: ExpirySweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ExpirySweepMetrics> {
    let metrics = Arc::new(ExpirySweepMetrics::new());

    let mut ticker = interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        "Expiry sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Expiry sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
                match sweep_expired(&state, Utc::now(), config.batch_size).await {
                    Ok(report) => {
                        metrics.images_deleted.fetch_add(report.deleted as u64, Ordering::Relaxed);
                        metrics.delete_failures.fetch_add(report.failed as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to list expired images");
                        metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    metrics
}
