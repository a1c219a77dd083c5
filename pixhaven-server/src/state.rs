//! Shared application state for the service layer.

use std::sync::Arc;
use std::time::Instant;

use pixhaven_core::ConfigError;
use pixhaven_storage::{
    BlobStore, CacheTransport, InMemoryBlobStore, InMemoryCacheTransport, InMemoryMetadataStore,
    InvalidationRouter, KeySpace, MetadataStore, ReadThroughCache,
};

use crate::config::{ReclamationMode, ServerConfig};
use crate::error::ApiResult;
use crate::reclamation::{InMemoryQueue, QueueTransport, ReclamationDispatcher};

/// Everything a request needs. Cheap to clone.
///
/// The metadata store and the cache are the only synchronization points
/// between concurrent requests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub cache: Arc<ReadThroughCache>,
    pub router: InvalidationRouter,
    pub dispatcher: ReclamationDispatcher,
    /// Present in queued mode; the reclamation worker consumes it.
    pub queue: Option<Arc<dyn QueueTransport>>,
    pub config: ServerConfig,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the collaborators. Queued mode requires a queue.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        cache_transport: Arc<dyn CacheTransport>,
        queue: Option<Arc<dyn QueueTransport>>,
    ) -> ApiResult<Self> {
        config.validate()?;

        let cache = Arc::new(ReadThroughCache::new(
            cache_transport,
            KeySpace::new(config.cache_namespace.clone()),
            config.cache.clone(),
        ));
        let router = InvalidationRouter::new(cache.clone());

        let dispatcher = match (config.reclamation_mode, &queue) {
            (ReclamationMode::Inline, _) => {
                ReclamationDispatcher::inline(blobs.clone(), config.reclaim_chunk_size)
            }
            (ReclamationMode::Queued, Some(queue)) => ReclamationDispatcher::queued(
                blobs.clone(),
                queue.clone(),
                config.reclaim_chunk_size,
            ),
            (ReclamationMode::Queued, None) => {
                return Err(ConfigError::MissingRequired {
                    field: "reclamation queue".to_string(),
                }
                .into());
            }
        };

        tracing::info!(
            namespace = %config.cache_namespace,
            reclamation_mode = %config.reclamation_mode,
            chunk_size = config.reclaim_chunk_size,
            "Application state initialized"
        );

        Ok(Self {
            store,
            blobs,
            cache,
            router,
            dispatcher,
            queue,
            config,
            start_time: Instant::now(),
        })
    }

    /// Fully in-memory state for local runs and tests.
    pub fn in_memory(config: ServerConfig) -> ApiResult<Self> {
        let queue: Option<Arc<dyn QueueTransport>> = match config.reclamation_mode {
            ReclamationMode::Queued => Some(Arc::new(InMemoryQueue::new(
                config.reclaim_max_attempts,
            ))),
            ReclamationMode::Inline => None,
        };
        Self::new(
            config,
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryCacheTransport::new()),
            queue,
        )
    }

    pub fn keys(&self) -> &KeySpace {
        self.cache.keys()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache)
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish()
    }
}
