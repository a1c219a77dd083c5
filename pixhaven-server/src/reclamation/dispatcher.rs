//! Reclamation dispatcher.
//!
//! Called once the metadata delete has committed, after the cache purge or
//! in place of it when the purge fails. Never fails the delete. Queued tasks
//! are retried by the worker; an inline failure is reported as a warning only.

use std::sync::Arc;

use pixhaven_core::ImageRef;
use pixhaven_storage::BlobStore;
use tracing::{error, info, warn};

use super::queue::QueueTransport;
use super::{ReclaimState, ReclamationTask};
use crate::config::ReclamationMode;
use crate::types::ReclaimSummary;

/// What happened to the blobs of one delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// `BlobsReclaimed` once every blob is gone, otherwise `CacheInvalidated`.
    pub state: ReclaimState,
    pub summary: ReclaimSummary,
    pub warning: Option<String>,
}

/// Routes reclamation tasks to inline deletion or the queue.
#[derive(Clone)]
pub struct ReclamationDispatcher {
    blobs: Arc<dyn BlobStore>,
    queue: Option<Arc<dyn QueueTransport>>,
    chunk_size: usize,
}

impl ReclamationDispatcher {
    /// Delete blobs in the request path.
    pub fn inline(blobs: Arc<dyn BlobStore>, chunk_size: usize) -> Self {
        Self {
            blobs,
            queue: None,
            chunk_size,
        }
    }

    /// Hand tasks to `queue`, falling back to inline deletion when it refuses.
    pub fn queued(
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn QueueTransport>,
        chunk_size: usize,
    ) -> Self {
        Self {
            blobs,
            queue: Some(queue),
            chunk_size,
        }
    }

    pub fn mode(&self) -> ReclamationMode {
        if self.queue.is_some() {
            ReclamationMode::Queued
        } else {
            ReclamationMode::Inline
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reclaim one deleted image.
    pub async fn reclaim_image(&self, image: &ImageRef) -> ReclaimOutcome {
        self.dispatch(vec![ReclamationTask::single(image)]).await
    }

    /// Reclaim the images removed by a tag cascade, one task per chunk.
    pub async fn reclaim_cascade(&self, origin: &str, images: &[ImageRef]) -> ReclaimOutcome {
        self.dispatch(ReclamationTask::chunked(origin, images, self.chunk_size))
            .await
    }

    async fn dispatch(&self, tasks: Vec<ReclamationTask>) -> ReclaimOutcome {
        let mut summary = ReclaimSummary {
            tasks: tasks.len(),
            ..ReclaimSummary::default()
        };
        let mut failures: Vec<String> = Vec::new();

        // Chunks are independent: one failing never stops the rest.
        for task in tasks.iter().filter(|task| !task.is_empty()) {
            if let Some(queue) = &self.queue {
                match queue.enqueue(task).await {
                    Ok(()) => {
                        summary.enqueued += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(
                            task_id = %task.task_id,
                            error = %err,
                            "Enqueue failed, reclaiming inline"
                        );
                    }
                }
            }

            match self.blobs.delete_many(&task.blob_keys).await {
                Ok(()) => summary.blobs_deleted += task.blob_keys.len(),
                Err(err) => {
                    error!(
                        task_id = %task.task_id,
                        images = task.image_ids.len(),
                        error = %err,
                        "Inline blob reclamation failed"
                    );
                    failures.push(err.to_string());
                }
            }
        }

        let fully_reclaimed = summary.enqueued == 0 && failures.is_empty();
        let state = if fully_reclaimed {
            ReclaimState::BlobsReclaimed
        } else {
            ReclaimState::CacheInvalidated
        };
        let warning = (!failures.is_empty()).then(|| {
            format!(
                "metadata deleted but {} of {} reclamation task(s) failed: {}",
                failures.len(),
                summary.tasks,
                failures.join("; ")
            )
        });

        info!(
            mode = %self.mode(),
            tasks = summary.tasks,
            enqueued = summary.enqueued,
            blobs_deleted = summary.blobs_deleted,
            state = %state,
            "Reclamation dispatched"
        );

        ReclaimOutcome {
            state,
            summary,
            warning,
        }
    }
}

impl std::fmt::Debug for ReclamationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclamationDispatcher")
            .field("mode", &self.mode())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reclamation::InMemoryQueue;
    use async_trait::async_trait;
    use pixhaven_core::{new_image_id, BlobError, ImageFormat, ImagePaths, Orientation};
    use pixhaven_storage::InMemoryBlobStore;

    async fn stored_image(blobs: &InMemoryBlobStore) -> ImageRef {
        let id = new_image_id();
        let paths = ImagePaths::generate(id, Orientation::Landscape, ImageFormat::Jpeg);
        for key in paths.blob_keys() {
            blobs.put(&key, vec![1, 2, 3], "image/jpeg").await.unwrap();
        }
        ImageRef { id, paths }
    }

    /// Fails deletes of keys containing any listed id.
    struct SelectiveBlobStore {
        inner: InMemoryBlobStore,
        poisoned: Vec<String>,
    }

    #[async_trait]
    impl BlobStore for SelectiveBlobStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, ct: &str) -> Result<(), BlobError> {
            self.inner.put(key, bytes, ct).await
        }

        async fn delete(&self, key: &str) -> Result<(), BlobError> {
            if self.poisoned.iter().any(|p| key.contains(p.as_str())) {
                return Err(BlobError::DeleteFailed {
                    key: key.to_string(),
                    reason: "injected".to_string(),
                });
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_inline_reclaims_every_blob() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let image = stored_image(&blobs).await;
        let dispatcher = ReclamationDispatcher::inline(blobs.clone(), 50);

        let outcome = dispatcher.reclaim_image(&image).await;
        assert_eq!(outcome.state, ReclaimState::BlobsReclaimed);
        assert_eq!(outcome.summary.blobs_deleted, 3);
        assert!(outcome.warning.is_none());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_queued_defers_reclamation() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        let image = stored_image(&blobs).await;
        let dispatcher = ReclamationDispatcher::queued(blobs.clone(), queue.clone(), 50);

        let outcome = dispatcher.reclaim_image(&image).await;
        assert_eq!(outcome.state, ReclaimState::CacheInvalidated);
        assert_eq!(outcome.summary.enqueued, 1);
        assert_eq!(blobs.len(), 3);
        assert_eq!(queue.ready_len().await, 1);
    }

    #[tokio::test]
    async fn test_refused_enqueue_falls_back_inline() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let queue = Arc::new(InMemoryQueue::default());
        queue.close().await;
        let image = stored_image(&blobs).await;
        let dispatcher = ReclamationDispatcher::queued(blobs.clone(), queue, 50);

        let outcome = dispatcher.reclaim_image(&image).await;
        assert_eq!(outcome.state, ReclaimState::BlobsReclaimed);
        assert_eq!(outcome.summary.enqueued, 0);
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_block_others() {
        let inner = InMemoryBlobStore::new();
        let mut images = Vec::new();
        for _ in 0..4 {
            images.push(stored_image(&inner).await);
        }
        let poisoned = images[0].id.to_string();
        let blobs = Arc::new(SelectiveBlobStore {
            inner,
            poisoned: vec![poisoned.clone()],
        });
        let dispatcher = ReclamationDispatcher::inline(blobs.clone(), 2);

        let outcome = dispatcher.reclaim_cascade("cats", &images).await;
        assert_eq!(outcome.summary.tasks, 2);
        assert_eq!(outcome.state, ReclaimState::CacheInvalidated);
        assert!(outcome.warning.as_deref().unwrap().contains("1 of 2"));

        // The second chunk's images are fully gone.
        for image in &images[2..] {
            for key in image.paths.blob_keys() {
                assert!(!blobs.inner.contains(&key));
            }
        }
        // The poisoned image's blobs remain for a later retry.
        assert!(blobs.inner.contains(&images[0].paths.original));
    }
}
