//! Shared wiring for service-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use pixhaven_core::ImageFormat;
use pixhaven_server::jobs::{ReclamationWorkerConfig, ReclamationWorkerMetrics};
use pixhaven_server::{
    services, ApiResult, AppState, DerivedImages, InMemoryQueue, QueueTransport,
    ReclamationMode, ServerConfig, UploadRequest,
};
use pixhaven_storage::{BlobStore, InMemoryMetadataStore};
use pixhaven_test_utils::fakes::{FaultyBlobStore, FlakyCacheTransport};

/// Application state over fault-injecting fakes, with handles to each.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<InMemoryMetadataStore>,
    pub cache: Arc<FlakyCacheTransport>,
    pub blobs: Arc<FaultyBlobStore>,
    pub queue: Option<Arc<InMemoryQueue>>,
}

impl Harness {
    pub fn inline() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn queued(chunk_size: usize) -> Self {
        Self::with_config(
            ServerConfig::default()
                .with_reclamation_mode(ReclamationMode::Queued)
                .with_reclaim_chunk_size(chunk_size),
        )
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(InMemoryMetadataStore::new());
        let cache = FlakyCacheTransport::new();
        let blobs = FaultyBlobStore::new();
        let queue = match config.reclamation_mode {
            ReclamationMode::Queued => Some(Arc::new(InMemoryQueue::new(
                config.reclaim_max_attempts,
            ))),
            ReclamationMode::Inline => None,
        };

        let state = AppState::new(
            config,
            store.clone(),
            blobs.clone(),
            cache.clone(),
            queue.clone().map(|q| q as Arc<dyn QueueTransport>),
        )
        .expect("valid test configuration");

        Self {
            state,
            store,
            cache,
            blobs,
            queue,
        }
    }

    pub fn queue(&self) -> &InMemoryQueue {
        self.queue.as_deref().expect("harness built in queued mode")
    }

    /// Run the reclamation worker until the queue has nothing ready.
    pub async fn drain_queue(&self) -> ReclamationWorkerMetrics {
        let metrics = ReclamationWorkerMetrics::new();
        let blobs: &dyn BlobStore = self.blobs.as_ref();
        pixhaven_server::jobs::drain(
            self.queue(),
            blobs,
            &ReclamationWorkerConfig::development(),
            &metrics,
        )
        .await;
        metrics
    }

    pub async fn upload(&self, name: &str, tags: &[&str]) -> ApiResult<pixhaven_core::ImageRecord> {
        services::upload_image(&self.state, landscape_jpeg(name, tags))
            .await
            .map(|response| response.image)
    }
}

/// A 1920x1080 JPEG upload with both derived copies.
pub fn landscape_jpeg(name: &str, tags: &[&str]) -> UploadRequest {
    UploadRequest::new(name, vec![0xFF; 64], ImageFormat::Jpeg)
        .with_dimensions(1920, 1080)
        .with_tags(tags.iter().copied())
        .with_derived(DerivedImages {
            webp: Some(vec![0x57; 32]),
            avif: Some(vec![0x41; 16]),
        })
}
