//! Image request and response types

use pixhaven_core::{ImageFormat, ImageId, ImageRecord};
use serde::{Deserialize, Serialize};

use crate::reclamation::ReclaimState;

/// Transcoded copies produced by the external pipeline.
///
/// Formats without derived variants (GIF) leave both empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedImages {
    pub webp: Option<Vec<u8>>,
    pub avif: Option<Vec<u8>>,
}

/// A new image, already decoded and transcoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub original_name: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Raw tag names; normalized and deduplicated on upload.
    pub tags: Vec<String>,
    /// Minutes until the image expires. `None` or 0 keeps it forever.
    pub expiry_minutes: Option<u64>,
    pub derived: DerivedImages,
}

impl UploadRequest {
    pub fn new(original_name: impl Into<String>, bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            original_name: original_name.into(),
            bytes,
            format,
            width: 0,
            height: 0,
            tags: Vec::new(),
            expiry_minutes: None,
            derived: DerivedImages::default(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiry_minutes(mut self, minutes: u64) -> Self {
        self.expiry_minutes = Some(minutes);
        self
    }

    pub fn with_derived(mut self, derived: DerivedImages) -> Self {
        self.derived = derived;
        self
    }
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub image: ImageRecord,
}

/// Requested change to an image. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateImageRequest {
    pub tags: Option<Vec<String>>,
    /// Minutes from now. `Some(0)` clears the expiry.
    pub expiry_minutes: Option<u64>,
}

/// Blob reclamation summary attached to a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimSummary {
    /// Reclamation tasks built for the delete.
    pub tasks: usize,
    /// Tasks handed to the queue for the worker.
    pub enqueued: usize,
    /// Blob keys deleted in the request path.
    pub blobs_deleted: usize,
}

/// Result of deleting one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub id: ImageId,
    pub state: ReclaimState,
    pub reclamation: ReclaimSummary,
    /// Set when metadata is gone but some blobs could not be reclaimed.
    pub warning: Option<String>,
}

/// Result of one expiry sweep cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
    /// Deletes that committed with a reclamation warning.
    pub warnings: usize,
}
