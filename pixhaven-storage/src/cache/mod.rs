//! Server-side cache layer.
//!
//! - [`KeySpace`] builds canonical keys for entities and collection queries.
//! - [`ReadThroughCache`] serves reads from a [`CacheTransport`] and fails open.
//! - [`InvalidationRouter`] turns each committed [`Mutation`] into a purge.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(ReadThroughCache::with_defaults(transport));
//! let router = InvalidationRouter::new(cache.clone());
//!
//! let key = cache.keys().make_collection_key(&CollectionQuery::Tags);
//! let tags = cache.get_or_fill(&key, ttl, || store.list_tags_opt()).await?;
//!
//! store.create_tag("cats").await?;
//! router.purge(&Mutation::TagCreated).await?;
//! ```

pub mod invalidation;
pub mod key_space;
pub mod memory;
pub mod read_through;
pub mod traits;

pub use invalidation::{InvalidationPlan, InvalidationReport, InvalidationRouter, Mutation};
pub use key_space::{CacheKey, CollectionQuery, KeyPattern, KeySpace, KEY_VERSION, WILDCARD};
pub use memory::InMemoryCacheTransport;
pub use read_through::{CacheConfig, CacheLookup, ReadThroughCache, ReadThroughStats};
pub use traits::{CacheStats, CacheTransport};
