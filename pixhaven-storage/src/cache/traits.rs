//! Cache transport trait and usage statistics.
//!
//! A transport is the remote key-value store behind the read-through cache
//! (Redis, a KV namespace, or the in-memory fake). Values are opaque strings;
//! encoding is the read-through layer's concern.

use async_trait::async_trait;
use pixhaven_core::CacheError;
use std::time::Duration;

use super::key_space::{CacheKey, KeyPattern};

/// Remote key-value store contract.
///
/// Every method may fail transiently. Callers on the read path treat
/// failures as misses; callers on the invalidation path propagate them.
#[async_trait]
pub trait CacheTransport: Send + Sync {
    /// Get a live value. Expired entries are reported as `None`.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Unconditional overwrite with a time-to-live.
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove one key. Removing an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Remove every key starting with `pattern`. Returns how many were removed.
    async fn delete_by_prefix(&self, pattern: &KeyPattern) -> Result<u64, CacheError>;

    /// Usage statistics.
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of entries removed by delete or prefix purge.
    pub purged: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
