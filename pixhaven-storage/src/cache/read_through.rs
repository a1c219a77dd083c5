//! Read-through cache with a fail-open read path.
//!
//! The cache is never authoritative. Reads that hit a broken transport or an
//! undecodable payload come back as [`CacheLookup::Miss`] and the caller falls
//! through to the metadata store. Writes go to the metadata store first and
//! only reach the cache through [`ReadThroughCache::fill`] or the invalidation
//! router.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pixhaven_core::{CacheError, HavenResult, ResourceClass};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::key_space::{CacheKey, KeyPattern, KeySpace};
use super::traits::CacheTransport;

/// Time-to-live per resource class and key kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for a single image's detail payload.
    pub image_detail_ttl: Duration,
    /// TTL for image list pages.
    pub image_list_ttl: Duration,
    /// TTL for the tag list.
    pub tag_list_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image_detail_ttl: Duration::from_secs(300),
            image_list_ttl: Duration::from_secs(60),
            tag_list_ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_detail_ttl(mut self, ttl: Duration) -> Self {
        self.image_detail_ttl = ttl;
        self
    }

    pub fn with_image_list_ttl(mut self, ttl: Duration) -> Self {
        self.image_list_ttl = ttl;
        self
    }

    pub fn with_tag_list_ttl(mut self, ttl: Duration) -> Self {
        self.tag_list_ttl = ttl;
        self
    }

    /// TTL for entity keys of `class`.
    pub fn entity_ttl(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Image => self.image_detail_ttl,
            ResourceClass::Tag => self.tag_list_ttl,
        }
    }

    /// TTL for collection keys of `class`.
    pub fn collection_ttl(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Image => self.image_list_ttl,
            ResourceClass::Tag => self.tag_list_ttl,
        }
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// Counters for the read path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadThroughStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that failed at the transport or decoder and were served as misses.
    pub degraded_reads: u64,
    /// Fills that could not be written back.
    pub failed_fills: u64,
}

/// Read-through cache over an injected [`CacheTransport`].
pub struct ReadThroughCache {
    transport: Arc<dyn CacheTransport>,
    keys: KeySpace,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    degraded_reads: AtomicU64,
    failed_fills: AtomicU64,
}

impl ReadThroughCache {
    pub fn new(transport: Arc<dyn CacheTransport>, keys: KeySpace, config: CacheConfig) -> Self {
        Self {
            transport,
            keys,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            degraded_reads: AtomicU64::new(0),
            failed_fills: AtomicU64::new(0),
        }
    }

    /// Create a read-through cache with the default key space and TTLs.
    pub fn with_defaults(transport: Arc<dyn CacheTransport>) -> Self {
        Self::new(transport, KeySpace::default(), CacheConfig::default())
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn CacheTransport> {
        &self.transport
    }

    pub fn stats(&self) -> ReadThroughStats {
        ReadThroughStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded_reads: self.degraded_reads.load(Ordering::Relaxed),
            failed_fills: self.failed_fills.load(Ordering::Relaxed),
        }
    }

    /// Look up a cached payload. Never fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        let raw = match self.transport.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return CacheLookup::Miss;
            }
            Err(err) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "Cache read failed, serving as miss");
                return CacheLookup::Miss;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                CacheLookup::Hit(value)
            }
            Err(err) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "Cached payload undecodable, serving as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Unconditional overwrite. Last writer wins.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.transport.set(key, raw, ttl).await
    }

    /// Write back a freshly loaded value, logging instead of failing.
    pub async fn fill<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        if let Err(err) = self.set(key, value, ttl).await {
            self.failed_fills.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %err, "Cache fill failed");
        }
    }

    /// Serve from cache, or run `load` against the source of truth and fill.
    ///
    /// `load` returning `Ok(None)` (entity absent) is not cached.
    pub async fn get_or_fill<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        load: F,
    ) -> HavenResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = HavenResult<Option<T>>>,
    {
        if let CacheLookup::Hit(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let loaded = load().await?;
        if let Some(value) = &loaded {
            self.fill(key, value, ttl).await;
        }
        Ok(loaded)
    }

    pub(crate) async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.transport.delete(key).await
    }

    pub(crate) async fn delete_by_prefix(&self, pattern: &KeyPattern) -> Result<u64, CacheError> {
        self.transport.delete_by_prefix(pattern).await
    }
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key_space::CollectionQuery;
    use crate::cache::memory::InMemoryCacheTransport;
    use crate::cache::traits::CacheStats;
    use async_trait::async_trait;
    use pixhaven_core::HavenError;

    struct BrokenTransport;

    #[async_trait]
    impl CacheTransport for BrokenTransport {
        async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
            Err(CacheError::Transport {
                operation: "get",
                key: key.to_string(),
                reason: "connection refused".to_string(),
            })
        }

        async fn set(&self, key: &CacheKey, _: String, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Transport {
                operation: "set",
                key: key.to_string(),
                reason: "connection refused".to_string(),
            })
        }

        async fn delete(&self, _: &CacheKey) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete_by_prefix(&self, _: &KeyPattern) -> Result<u64, CacheError> {
            Ok(0)
        }

        async fn stats(&self) -> Result<CacheStats, CacheError> {
            Ok(CacheStats::default())
        }
    }

    #[tokio::test]
    async fn test_get_or_fill_fills_once() {
        let cache = ReadThroughCache::with_defaults(Arc::new(InMemoryCacheTransport::new()));
        let key = cache.keys().make_collection_key(&CollectionQuery::Tags);
        let ttl = Duration::from_secs(60);

        let first: Option<Vec<String>> = cache
            .get_or_fill(&key, ttl, || async {
                Ok::<_, HavenError>(Some(vec!["cats".to_string()]))
            })
            .await
            .unwrap();
        let second: Option<Vec<String>> = cache
            .get_or_fill(&key, ttl, || async {
                Err(HavenError::from(pixhaven_core::StorageError::Unavailable {
                    reason: "loader must not run on a hit".to_string(),
                }))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_absent_entity_is_not_cached() {
        let transport = Arc::new(InMemoryCacheTransport::new());
        let cache = ReadThroughCache::with_defaults(transport.clone());
        let key = cache
            .keys()
            .make_entity_key(ResourceClass::Image, uuid::Uuid::nil());

        let loaded: Option<String> = cache
            .get_or_fill(&key, Duration::from_secs(60), || async {
                Ok::<_, HavenError>(None)
            })
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_fails_open() {
        let cache = ReadThroughCache::with_defaults(Arc::new(BrokenTransport));
        let key = cache.keys().make_collection_key(&CollectionQuery::Tags);

        let lookup: CacheLookup<Vec<String>> = cache.get(&key).await;
        assert_eq!(lookup, CacheLookup::Miss);

        let loaded: Option<Vec<String>> = cache
            .get_or_fill(&key, Duration::from_secs(60), || async {
                Ok::<_, HavenError>(Some(vec!["dogs".to_string()]))
            })
            .await
            .unwrap();
        assert_eq!(loaded, Some(vec!["dogs".to_string()]));

        let stats = cache.stats();
        assert_eq!(stats.degraded_reads, 2);
        assert_eq!(stats.failed_fills, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let transport = Arc::new(InMemoryCacheTransport::new());
        let cache = ReadThroughCache::with_defaults(transport.clone());
        let key = cache.keys().make_collection_key(&CollectionQuery::Tags);
        transport
            .set(&key, "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let lookup: CacheLookup<Vec<String>> = cache.get(&key).await;
        assert!(!lookup.is_hit());
    }

    #[test]
    fn test_config_ttl_routing() {
        let config = CacheConfig::new()
            .with_image_detail_ttl(Duration::from_secs(1))
            .with_image_list_ttl(Duration::from_secs(2))
            .with_tag_list_ttl(Duration::from_secs(3));
        assert_eq!(config.entity_ttl(ResourceClass::Image), Duration::from_secs(1));
        assert_eq!(config.collection_ttl(ResourceClass::Image), Duration::from_secs(2));
        assert_eq!(config.collection_ttl(ResourceClass::Tag), Duration::from_secs(3));
    }
}
