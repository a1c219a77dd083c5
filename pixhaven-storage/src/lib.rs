//! Pixhaven Storage - Collaborator Contracts and Cache Engine
//!
//! Defines the metadata store and blob store contracts the server consumes,
//! in-memory implementations of both, and the read-through cache with its
//! invalidation router.

pub mod blob;
pub mod cache;
pub mod metadata;

pub use blob::{BlobStore, InMemoryBlobStore, StoredBlob};
pub use cache::{
    CacheConfig, CacheKey, CacheLookup, CacheStats, CacheTransport, CollectionQuery,
    InMemoryCacheTransport, InvalidationPlan, InvalidationReport, InvalidationRouter, KeyPattern,
    KeySpace, Mutation, ReadThroughCache, ReadThroughStats,
};
pub use metadata::{InMemoryMetadataStore, MetadataStore};
