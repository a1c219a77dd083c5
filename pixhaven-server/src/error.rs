//! Error Types for the pixhaven server
//!
//! - `ErrorCode` categorizes failures and maps each to an HTTP status.
//! - `ApiError` is the structured error every service operation returns.
//!
//! The routing layer is external; it only needs `status_code()` and the
//! serialized `ApiError` body.

use pixhaven_core::{
    BlobError, CacheError, ConfigError, HavenError, QueueError, StorageError, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for service responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400, 413)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Upload exceeds the size limit
    PayloadTooLarge,

    // ========================================================================
    // Not Found / Conflict (404, 409)
    // ========================================================================
    /// Requested image does not exist
    ImageNotFound,

    /// Requested tag does not exist
    TagNotFound,

    /// Entity with the same identity already exists
    EntityAlreadyExists,

    // ========================================================================
    // Dependency Errors (502, 503)
    // ========================================================================
    /// Cache invalidation failed; the mutation must be retried
    CacheInvalidationFailed,

    /// Metadata store is unavailable
    StorageUnavailable,

    /// Blob store rejected a write or delete
    BlobStoreFailed,

    /// Reclamation queue rejected a message
    QueueUnavailable,

    // ========================================================================
    // Internal Errors (500)
    // ========================================================================
    /// Server misconfiguration
    ConfigurationInvalid,

    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => 400,
            ErrorCode::ImageNotFound | ErrorCode::TagNotFound => 404,
            ErrorCode::EntityAlreadyExists => 409,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::BlobStoreFailed => 502,
            ErrorCode::CacheInvalidationFailed
            | ErrorCode::StorageUnavailable
            | ErrorCode::QueueUnavailable => 503,
            ErrorCode::ConfigurationInvalid | ErrorCode::InternalError => 500,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::CacheInvalidationFailed
                | ErrorCode::StorageUnavailable
                | ErrorCode::BlobStoreFailed
                | ErrorCode::QueueUnavailable
        )
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::MissingField => "Required field missing",
            ErrorCode::PayloadTooLarge => "Payload too large",
            ErrorCode::ImageNotFound => "Image not found",
            ErrorCode::TagNotFound => "Tag not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::CacheInvalidationFailed => "Cache invalidation failed, retry the request",
            ErrorCode::StorageUnavailable => "Metadata store unavailable",
            ErrorCode::BlobStoreFailed => "Blob store operation failed",
            ErrorCode::QueueUnavailable => "Reclamation queue unavailable",
            ErrorCode::ConfigurationInvalid => "Server configuration invalid",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("Required field missing: {}", field))
    }

    pub fn image_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ImageNotFound, format!("Image not found: {}", id))
    }

    pub fn tag_not_found(name: &str) -> Self {
        Self::new(ErrorCode::TagNotFound, format!("Tag not found: {}", name))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { class, id } => match class {
                pixhaven_core::ResourceClass::Image => ApiError::image_not_found(id),
                pixhaven_core::ResourceClass::Tag => ApiError::tag_not_found(id),
            },
            StorageError::AlreadyExists { .. } => {
                ApiError::new(ErrorCode::EntityAlreadyExists, err.to_string())
            }
            StorageError::WriteFailed { .. }
            | StorageError::Unavailable { .. }
            | StorageError::LockPoisoned => {
                tracing::error!(error = %err, "Metadata store error");
                ApiError::new(ErrorCode::StorageUnavailable, err.to_string())
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        // Read-path cache errors never get here; only invalidation failures do.
        tracing::error!(error = %err, "Cache invalidation error");
        ApiError::new(ErrorCode::CacheInvalidationFailed, err.to_string())
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        tracing::error!(error = %err, "Blob store error");
        ApiError::new(ErrorCode::BlobStoreFailed, err.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        tracing::error!(error = %err, "Queue error");
        ApiError::new(ErrorCode::QueueUnavailable, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::MissingField,
            ValidationError::InvalidValue { .. } => ErrorCode::InvalidInput,
            ValidationError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        ApiError::new(ErrorCode::ConfigurationInvalid, err.to_string())
    }
}

impl From<HavenError> for ApiError {
    fn from(err: HavenError) -> Self {
        match err {
            HavenError::Storage(e) => e.into(),
            HavenError::Cache(e) => e.into(),
            HavenError::Blob(e) => e.into(),
            HavenError::Queue(e) => e.into(),
            HavenError::Validation(e) => e.into(),
            HavenError::Config(e) => e.into(),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for service operations.
pub type ApiResult<T> = Result<T, ApiError>;
