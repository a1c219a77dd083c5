//! Server Configuration Module
//!
//! Configuration is loaded from environment variables with defaults from
//! `constants.rs`. Background jobs carry their own config types in `jobs/`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pixhaven_core::ConfigError;
use pixhaven_storage::CacheConfig;

use crate::constants::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_IMAGE_DETAIL_TTL_SECS, DEFAULT_IMAGE_LIST_TTL_SECS,
    DEFAULT_PAGE_LIMIT, DEFAULT_RECLAIM_CHUNK_SIZE, DEFAULT_RECLAIM_MAX_ATTEMPTS,
    DEFAULT_TAG_LIST_TTL_SECS,
};

/// Read and parse an environment variable, falling back to `default` when
/// unset or unparseable.
pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag. Only "true" and "1" enable it.
pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

// ============================================================================
// RECLAMATION MODE
// ============================================================================

/// How blob reclamation runs after a metadata delete commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReclamationMode {
    /// Delete blobs in the request path.
    #[default]
    Inline,
    /// Enqueue a task for the reclamation worker.
    Queued,
}

impl fmt::Display for ReclamationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReclamationMode::Inline => f.write_str("inline"),
            ReclamationMode::Queued => f.write_str("queued"),
        }
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// Request-path configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Key namespace for the shared cache.
    pub cache_namespace: String,

    /// Per-class cache TTLs.
    pub cache: CacheConfig,

    /// Page size when a list request does not give one.
    pub default_page_limit: u32,

    /// Inline or queued blob reclamation.
    pub reclamation_mode: ReclamationMode,

    /// Images per queued reclamation message for cascade deletes.
    pub reclaim_chunk_size: usize,

    /// Deliveries before a reclamation message is dead-lettered.
    pub reclaim_max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            cache: CacheConfig::new()
                .with_image_detail_ttl(Duration::from_secs(DEFAULT_IMAGE_DETAIL_TTL_SECS))
                .with_image_list_ttl(Duration::from_secs(DEFAULT_IMAGE_LIST_TTL_SECS))
                .with_tag_list_ttl(Duration::from_secs(DEFAULT_TAG_LIST_TTL_SECS)),
            default_page_limit: DEFAULT_PAGE_LIMIT,
            reclamation_mode: ReclamationMode::Inline,
            reclaim_chunk_size: DEFAULT_RECLAIM_CHUNK_SIZE,
            reclaim_max_attempts: DEFAULT_RECLAIM_MAX_ATTEMPTS,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PIXHAVEN_CACHE_NAMESPACE`: Cache key namespace (default: "pixhaven")
    /// - `PIXHAVEN_IMAGE_DETAIL_TTL_SECS`: Image detail TTL (default: 300)
    /// - `PIXHAVEN_IMAGE_LIST_TTL_SECS`: Image list TTL (default: 60)
    /// - `PIXHAVEN_TAG_LIST_TTL_SECS`: Tag list TTL (default: 300)
    /// - `PIXHAVEN_DEFAULT_PAGE_LIMIT`: Default page size (default: 12)
    /// - `PIXHAVEN_USE_QUEUE`: "true" selects queued reclamation (default: inline)
    /// - `PIXHAVEN_RECLAIM_CHUNK_SIZE`: Images per queued message (default: 50)
    /// - `PIXHAVEN_RECLAIM_MAX_ATTEMPTS`: Deliveries before dead-lettering (default: 5)
    pub fn from_env() -> Self {
        let cache_namespace = std::env::var("PIXHAVEN_CACHE_NAMESPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());

        let cache = CacheConfig::new()
            .with_image_detail_ttl(Duration::from_secs(env_or(
                "PIXHAVEN_IMAGE_DETAIL_TTL_SECS",
                DEFAULT_IMAGE_DETAIL_TTL_SECS,
            )))
            .with_image_list_ttl(Duration::from_secs(env_or(
                "PIXHAVEN_IMAGE_LIST_TTL_SECS",
                DEFAULT_IMAGE_LIST_TTL_SECS,
            )))
            .with_tag_list_ttl(Duration::from_secs(env_or(
                "PIXHAVEN_TAG_LIST_TTL_SECS",
                DEFAULT_TAG_LIST_TTL_SECS,
            )));

        let reclamation_mode = if env_flag("PIXHAVEN_USE_QUEUE") {
            ReclamationMode::Queued
        } else {
            ReclamationMode::Inline
        };

        Self {
            cache_namespace,
            cache,
            default_page_limit: env_or("PIXHAVEN_DEFAULT_PAGE_LIMIT", DEFAULT_PAGE_LIMIT),
            reclamation_mode,
            reclaim_chunk_size: env_or("PIXHAVEN_RECLAIM_CHUNK_SIZE", DEFAULT_RECLAIM_CHUNK_SIZE),
            reclaim_max_attempts: env_or(
                "PIXHAVEN_RECLAIM_MAX_ATTEMPTS",
                DEFAULT_RECLAIM_MAX_ATTEMPTS,
            ),
        }
    }

    pub fn with_reclamation_mode(mut self, mode: ReclamationMode) -> Self {
        self.reclamation_mode = mode;
        self
    }

    pub fn with_reclaim_chunk_size(mut self, size: usize) -> Self {
        self.reclaim_chunk_size = size;
        self
    }

    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }

    /// Reject values that would make the server misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_namespace.is_empty() || self.cache_namespace.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: "cache_namespace".to_string(),
                value: self.cache_namespace.clone(),
                reason: "must be non-empty and must not contain ':'".to_string(),
            });
        }
        if self.reclaim_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reclaim_chunk_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reclaim_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reclaim_max_attempts".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_limit".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, ttl) in [
            ("image_detail_ttl", self.cache.image_detail_ttl),
            ("image_list_ttl", self.cache.image_list_ttl),
            ("tag_list_ttl", self.cache.tag_list_ttl),
        ] {
            if ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "ttl must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}
