//! Image metadata records and their storage paths.

use crate::{normalize_tag_list, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Image identifier using UUIDv7 for timestamp-sortable IDs.
pub type ImageId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 image id (timestamp-sortable).
pub fn new_image_id() -> ImageId {
    Uuid::now_v7()
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// Orientation of an image, derived from its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Square images count as landscape.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width >= height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "landscape" => Ok(Orientation::Landscape),
            "portrait" => Ok(Orientation::Portrait),
            other => Err(ValidationError::InvalidValue {
                field: "orientation".to_string(),
                reason: format!("unknown orientation '{}'", other),
            }),
        }
    }
}

// ============================================================================
// FORMAT
// ============================================================================

/// Source format of an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    /// File extension used for the original representation.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            other => other.as_str(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
        }
    }

    /// Animated GIFs are stored as-is, without derived representations.
    pub fn has_derived_variants(&self) -> bool {
        !matches!(self, ImageFormat::Gif)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            other => Err(ValidationError::InvalidValue {
                field: "format".to_string(),
                reason: format!("unsupported format '{}'", other),
            }),
        }
    }
}

// ============================================================================
// PATHS AND SIZES
// ============================================================================

/// Object-store keys for every representation of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImagePaths {
    pub original: String,
    pub webp: Option<String>,
    pub avif: Option<String>,
}

impl ImagePaths {
    /// Deterministic layout: `original/{orientation}/{id}.{ext}` for the
    /// original and `{orientation}/{variant}/{id}.{variant}` for derived copies.
    pub fn generate(id: ImageId, orientation: Orientation, format: ImageFormat) -> Self {
        let original = format!("original/{}/{}.{}", orientation, id, format.extension());
        if !format.has_derived_variants() {
            return Self {
                original,
                webp: None,
                avif: None,
            };
        }
        Self {
            original,
            webp: Some(format!("{}/webp/{}.webp", orientation, id)),
            avif: Some(format!("{}/avif/{}.avif", orientation, id)),
        }
    }

    /// Ordered, deduplicated, non-empty storage keys.
    pub fn blob_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::with_capacity(3);
        let candidates = [
            Some(&self.original),
            self.webp.as_ref(),
            self.avif.as_ref(),
        ];
        for key in candidates.into_iter().flatten() {
            if !key.is_empty() && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

/// Byte sizes of each stored representation (0 when absent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSizes {
    pub original: u64,
    pub webp: u64,
    pub avif: u64,
}

// ============================================================================
// RECORDS
// ============================================================================

/// Metadata for one hosted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub original_name: String,
    pub upload_time: Timestamp,
    pub expiry_time: Option<Timestamp>,
    pub orientation: Orientation,
    pub tags: Vec<String>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub paths: ImagePaths,
    pub sizes: ImageSizes,
}

impl ImageRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry_time.map(|expiry| expiry <= now).unwrap_or(false)
    }

    /// Gallery order: newest upload first, ties broken by descending id.
    pub fn gallery_order(&self, other: &ImageRecord) -> Ordering {
        other
            .upload_time
            .cmp(&self.upload_time)
            .then_with(|| other.id.cmp(&self.id))
    }

    pub fn to_ref(&self) -> ImageRef {
        ImageRef {
            id: self.id,
            paths: self.paths.clone(),
        }
    }
}

/// Identity plus blob locations, enough to reclaim storage after the
/// metadata row is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: ImageId,
    pub paths: ImagePaths,
}

/// Change to an image's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryChange {
    Clear,
    At(Timestamp),
}

/// Partial update of an image's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePatch {
    /// Replacement tag set. `Some(vec![])` clears all tags.
    pub tags: Option<Vec<String>>,
    pub expiry: Option<ExpiryChange>,
}

impl ImagePatch {
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = Some(normalize_tag_list(tags));
        self
    }

    pub fn with_expiry(mut self, expiry: ExpiryChange) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.expiry.is_none()
    }

    /// True when the patch touches a field that collection filters match on.
    pub fn changes_filter_fields(&self) -> bool {
        self.tags.is_some()
    }

    pub fn apply_to(&self, record: &mut ImageRecord) {
        if let Some(tags) = &self.tags {
            record.tags = normalize_tag_list(tags);
        }
        match self.expiry {
            Some(ExpiryChange::Clear) => record.expiry_time = None,
            Some(ExpiryChange::At(at)) => record.expiry_time = Some(at),
            None => {}
        }
    }
}
