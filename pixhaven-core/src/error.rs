//! Error types for pixhaven operations

use crate::ResourceClass;
use thiserror::Error;

/// Metadata store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {class} with id {id}")]
    NotFound { class: ResourceClass, id: String },

    #[error("Entity already exists: {class} with id {id}")]
    AlreadyExists { class: ResourceClass, id: String },

    #[error("Write failed for {class}: {reason}")]
    WriteFailed { class: ResourceClass, reason: String },

    #[error("Metadata store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache transport errors.
///
/// On the read path these degrade to a miss. On the invalidation path they
/// are fatal to the enclosing mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache transport failed during {operation} on {key}: {reason}")]
    Transport {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Cached payload for {key} could not be encoded: {reason}")]
    Serialization { key: String, reason: String },
}

/// Blob store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("Blob put failed for {key}: {reason}")]
    PutFailed { key: String, reason: String },

    #[error("Blob delete failed for {key}: {reason}")]
    DeleteFailed { key: String, reason: String },

    #[error("Blob store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Queue transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Enqueue failed: {reason}")]
    SendFailed { reason: String },

    #[error("Queue is closed")]
    Closed,

    #[error("Message encoding failed: {reason}")]
    Encoding { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Payload too large: {size} bytes exceeds {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all pixhaven errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HavenError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for pixhaven operations.
pub type HavenResult<T> = Result<T, HavenError>;

// =============================================================================
// TESTS
// =============================================================================
