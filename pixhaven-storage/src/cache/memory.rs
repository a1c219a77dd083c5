//! In-memory cache transport.
//!
//! Entries carry an absolute expiry instant and are never mutated in place;
//! `set` replaces the whole entry. Expired entries are dropped lazily on read.

use async_trait::async_trait;
use dashmap::DashMap;
use pixhaven_core::CacheError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::key_space::{CacheKey, KeyPattern};
use super::traits::{CacheStats, CacheTransport};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// DashMap-backed transport for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCacheTransport {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    purged: AtomicU64,
}

impl InMemoryCacheTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists, without touching hit/miss counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key.as_str())
            .map(|entry| entry.is_live(Instant::now()))
            .unwrap_or(false)
    }

    /// Live keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheTransport for InMemoryCacheTransport {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let live = match self.entries.get(key.as_str()) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                // Only drop the entry if nobody replaced it in the meantime.
                self.entries
                    .remove_if(key.as_str(), |_, entry| !entry.is_live(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Transport {
                operation: "set",
                key: key.to_string(),
                reason: format!("ttl {:?} overflows the clock", ttl),
            })?;
        self.entries
            .insert(key.as_str().to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        if self.entries.remove(key.as_str()).is_some() {
            self.purged.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn delete_by_prefix(&self, pattern: &KeyPattern) -> Result<u64, CacheError> {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| !key.starts_with(pattern.as_str()));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        self.purged.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            purged: self.purged.load(Ordering::Relaxed),
        })
    }
}
