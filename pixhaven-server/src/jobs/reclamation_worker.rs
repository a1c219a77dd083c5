//! Reclamation Worker Background Task
//!
//! Consumes [`ReclamationTask`](crate::reclamation::ReclamationTask) messages
//! and deletes every listed blob. Deleting an absent blob succeeds, so a
//! redelivered task is harmless. A failed task goes back to the queue with
//! exponential backoff until the queue parks it as a dead letter.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(reclamation_worker_task(queue, blobs, config, shutdown_rx));
//! // ...
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use pixhaven_storage::BlobStore;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::env_or;
use crate::constants::{
    DEFAULT_RECLAIM_BATCH_SIZE, DEFAULT_RECLAIM_POLL_INTERVAL_MS, DEFAULT_RECLAIM_RETRY_BACKOFF_MS,
    MAX_RECLAIM_RETRY_BACKOFF_MS,
};
use crate::reclamation::{Delivery, QueueTransport, RetryOutcome};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclamationWorkerConfig {
    /// How often to poll the queue (default: 500ms)
    pub poll_interval: Duration,

    /// Messages received and handled concurrently per poll (default: 10)
    pub batch_size: usize,

    /// Delay before the second delivery; doubled on each later one (default: 1s)
    pub retry_backoff: Duration,

    /// Cap on the redelivery delay (default: 60s)
    pub max_retry_backoff: Duration,
}

impl Default for ReclamationWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_RECLAIM_POLL_INTERVAL_MS),
            batch_size: DEFAULT_RECLAIM_BATCH_SIZE,
            retry_backoff: Duration::from_millis(DEFAULT_RECLAIM_RETRY_BACKOFF_MS),
            max_retry_backoff: Duration::from_millis(MAX_RECLAIM_RETRY_BACKOFF_MS),
        }
    }
}

impl ReclamationWorkerConfig {
    /// # Environment Variables
    /// - `PIXHAVEN_RECLAIM_POLL_INTERVAL_MS` (default: 500)
    /// - `PIXHAVEN_RECLAIM_BATCH_SIZE` (default: 10)
    /// - `PIXHAVEN_RECLAIM_RETRY_BACKOFF_MS` (default: 1000)
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_or(
                "PIXHAVEN_RECLAIM_POLL_INTERVAL_MS",
                DEFAULT_RECLAIM_POLL_INTERVAL_MS,
            )),
            batch_size: env_or("PIXHAVEN_RECLAIM_BATCH_SIZE", DEFAULT_RECLAIM_BATCH_SIZE).max(1),
            retry_backoff: Duration::from_millis(env_or(
                "PIXHAVEN_RECLAIM_RETRY_BACKOFF_MS",
                DEFAULT_RECLAIM_RETRY_BACKOFF_MS,
            )),
            max_retry_backoff: Duration::from_millis(MAX_RECLAIM_RETRY_BACKOFF_MS),
        }
    }

    /// Fast polling and immediate redelivery, for tests and local runs.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
            retry_backoff: Duration::ZERO,
            max_retry_backoff: Duration::ZERO,
        }
    }

    /// Delay before delivery number `attempt + 1`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_backoff)
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct ReclamationWorkerMetrics {
    pub tasks_acked: AtomicU64,
    pub tasks_retried: AtomicU64,
    pub tasks_dead_lettered: AtomicU64,
    pub blobs_deleted: AtomicU64,
    pub errors: AtomicU64,
    pub poll_cycles: AtomicU64,
}

impl ReclamationWorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReclamationWorkerSnapshot {
        ReclamationWorkerSnapshot {
            tasks_acked: self.tasks_acked.load(Ordering::Relaxed),
            tasks_retried: self.tasks_retried.load(Ordering::Relaxed),
            tasks_dead_lettered: self.tasks_dead_lettered.load(Ordering::Relaxed),
            blobs_deleted: self.blobs_deleted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclamationWorkerSnapshot {
    pub tasks_acked: u64,
    pub tasks_retried: u64,
    pub tasks_dead_lettered: u64,
    pub blobs_deleted: u64,
    pub errors: u64,
    pub poll_cycles: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Poll `queue` until the shutdown signal flips to true.
pub async fn reclamation_worker_task(
    queue: Arc<dyn QueueTransport>,
    blobs: Arc<dyn BlobStore>,
    config: ReclamationWorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReclamationWorkerMetrics> {
    let metrics = Arc::new(ReclamationWorkerMetrics::new());

    let mut poll = interval(config.poll_interval.max(Duration::from_millis(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        batch_size = config.batch_size,
        "Reclamation worker started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Reclamation worker shutting down");
                    break;
                }
            }

            _ = poll.tick() => {
                process_batch(queue.as_ref(), blobs.as_ref(), &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        tasks_acked = snapshot.tasks_acked,
        tasks_retried = snapshot.tasks_retried,
        tasks_dead_lettered = snapshot.tasks_dead_lettered,
        blobs_deleted = snapshot.blobs_deleted,
        errors = snapshot.errors,
        "Reclamation worker completed"
    );

    metrics
}

/// Receive and handle one batch. Returns the number of deliveries handled.
pub async fn process_batch(
    queue: &dyn QueueTransport,
    blobs: &dyn BlobStore,
    config: &ReclamationWorkerConfig,
    metrics: &ReclamationWorkerMetrics,
) -> usize {
    metrics.poll_cycles.fetch_add(1, Ordering::Relaxed);

    let deliveries = match queue.receive(config.batch_size.max(1)).await {
        Ok(deliveries) => deliveries,
        Err(e) => {
            tracing::error!(error = %e, "Failed to receive reclamation messages");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return 0;
        }
    };

    let handled = deliveries.len();
    join_all(
        deliveries
            .into_iter()
            .map(|delivery| handle_delivery(queue, blobs, config, metrics, delivery)),
    )
    .await;

    if handled > 0 {
        tracing::debug!(handled, "Reclamation batch handled");
    }
    handled
}

/// Poll until a cycle receives nothing. For tests and graceful drains.
pub async fn drain(
    queue: &dyn QueueTransport,
    blobs: &dyn BlobStore,
    config: &ReclamationWorkerConfig,
    metrics: &ReclamationWorkerMetrics,
) -> usize {
    let mut total = 0;
    loop {
        let handled = process_batch(queue, blobs, config, metrics).await;
        if handled == 0 {
            return total;
        }
        total += handled;
    }
}

async fn handle_delivery(
    queue: &dyn QueueTransport,
    blobs: &dyn BlobStore,
    config: &ReclamationWorkerConfig,
    metrics: &ReclamationWorkerMetrics,
    delivery: Delivery,
) {
    let task = &delivery.task;
    match blobs.delete_many(&task.blob_keys).await {
        Ok(()) => {
            metrics
                .blobs_deleted
                .fetch_add(task.blob_keys.len() as u64, Ordering::Relaxed);
            match queue.ack(delivery.receipt).await {
                Ok(true) => {
                    metrics.tasks_acked.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => {
                    // Redelivered meanwhile; the other delivery acks it.
                    tracing::debug!(task_id = %task.task_id, "Stale receipt on ack");
                }
                Err(e) => {
                    tracing::error!(task_id = %task.task_id, error = %e, "Failed to ack task");
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(err) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            let delay = config.backoff_for(delivery.attempt);
            tracing::warn!(
                task_id = %task.task_id,
                attempt = delivery.attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "Blob reclamation failed"
            );
            match queue.retry(delivery.receipt, delay).await {
                Ok(RetryOutcome::Requeued { .. }) => {
                    metrics.tasks_retried.fetch_add(1, Ordering::Relaxed);
                }
                Ok(RetryOutcome::DeadLettered { attempts }) => {
                    tracing::error!(
                        task_id = %task.task_id,
                        attempts,
                        blobs = task.blob_keys.len(),
                        "Reclamation task dead-lettered"
                    );
                    metrics.tasks_dead_lettered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(RetryOutcome::Stale) => {
                    tracing::debug!(task_id = %task.task_id, "Stale receipt on retry");
                }
                Err(e) => {
                    tracing::error!(task_id = %task.task_id, error = %e, "Failed to requeue task");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reclamation::{InMemoryQueue, ReclamationTask};
    use async_trait::async_trait;
    use pixhaven_core::{new_image_id, BlobError, ImageFormat, ImagePaths, ImageRef, Orientation};
    use pixhaven_storage::InMemoryBlobStore;
    use std::sync::atomic::AtomicU32;

    async fn stored(blobs: &InMemoryBlobStore) -> ImageRef {
        let id = new_image_id();
        let paths = ImagePaths::generate(id, Orientation::Landscape, ImageFormat::Png);
        for key in paths.blob_keys() {
            blobs.put(&key, vec![0], "image/png").await.unwrap();
        }
        ImageRef { id, paths }
    }

    /// Fails the first `failures` deletes, then delegates.
    struct FlakyBlobs {
        inner: InMemoryBlobStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl BlobStore for FlakyBlobs {
        async fn put(&self, key: &str, bytes: Vec<u8>, ct: &str) -> Result<(), BlobError> {
            self.inner.put(key, bytes, ct).await
        }

        async fn delete(&self, key: &str) -> Result<(), BlobError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BlobError::Unavailable {
                    reason: "transient".to_string(),
                });
            }
            self.inner.delete(key).await
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ReclamationWorkerConfig {
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_millis(500),
            ..ReclamationWorkerConfig::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for(4), Duration::from_millis(500));
        assert_eq!(config.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_env_defaults() {
        let config = ReclamationWorkerConfig::from_env();
        assert_eq!(config.batch_size, DEFAULT_RECLAIM_BATCH_SIZE);
        assert_eq!(
            config.poll_interval,
            Duration::from_millis(DEFAULT_RECLAIM_POLL_INTERVAL_MS)
        );
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = ReclamationWorkerMetrics::new();
        metrics.tasks_acked.store(4, Ordering::Relaxed);
        metrics.tasks_dead_lettered.store(1, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_acked, 4);
        assert_eq!(snapshot.tasks_dead_lettered, 1);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn test_successful_task_is_acked() {
        let queue = InMemoryQueue::new(3);
        let blobs = InMemoryBlobStore::new();
        let image = stored(&blobs).await;
        queue.enqueue(&ReclamationTask::single(&image)).await.unwrap();

        let metrics = ReclamationWorkerMetrics::new();
        let config = ReclamationWorkerConfig::development();
        assert_eq!(drain(&queue, &blobs, &config, &metrics).await, 1);

        assert!(blobs.is_empty());
        assert!(queue.is_drained().await);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_acked, 1);
        assert_eq!(snapshot.blobs_deleted, 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_redelivered_then_acked() {
        let queue = InMemoryQueue::new(5);
        let inner = InMemoryBlobStore::new();
        let image = stored(&inner).await;
        let blobs = FlakyBlobs {
            inner,
            failures: AtomicU32::new(1),
        };
        queue.enqueue(&ReclamationTask::single(&image)).await.unwrap();

        let metrics = ReclamationWorkerMetrics::new();
        let config = ReclamationWorkerConfig::development();
        drain(&queue, &blobs, &config, &metrics).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_retried, 1);
        assert_eq!(snapshot.tasks_acked, 1);
        assert!(blobs.inner.is_empty());
        assert!(queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_failure_is_dead_lettered() {
        let queue = InMemoryQueue::new(3);
        let inner = InMemoryBlobStore::new();
        let image = stored(&inner).await;
        let blobs = FlakyBlobs {
            inner,
            failures: AtomicU32::new(u32::MAX),
        };
        queue.enqueue(&ReclamationTask::single(&image)).await.unwrap();

        let metrics = ReclamationWorkerMetrics::new();
        let config = ReclamationWorkerConfig::development();
        drain(&queue, &blobs, &config, &metrics).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_retried, 2);
        assert_eq!(snapshot.tasks_dead_lettered, 1);
        assert_eq!(snapshot.tasks_acked, 0);
        assert_eq!(queue.dead_letters().await.len(), 1);
        assert!(queue.is_drained().await);
    }

    #[tokio::test]
    async fn test_redelivered_task_has_no_double_effect() {
        let queue = InMemoryQueue::new(3);
        let blobs = InMemoryBlobStore::new();
        let image = stored(&blobs).await;
        let task = ReclamationTask::single(&image);
        queue.enqueue(&task).await.unwrap();
        queue.enqueue(&task).await.unwrap();

        let metrics = ReclamationWorkerMetrics::new();
        drain(&queue, &blobs, &ReclamationWorkerConfig::development(), &metrics).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_acked, 2);
        assert_eq!(snapshot.errors, 0);
        // Three blobs existed, so only three deletes had any effect.
        assert_eq!(blobs.effective_deletes(), 3);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let queue: Arc<dyn QueueTransport> = Arc::new(InMemoryQueue::new(3));
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(reclamation_worker_task(
            queue,
            blobs,
            ReclamationWorkerConfig::development(),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();

        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().poll_cycles >= 1);
    }
}
