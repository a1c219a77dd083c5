//! Tag request and response types

use pixhaven_core::ImageId;
use serde::{Deserialize, Serialize};

use crate::reclamation::ReclaimState;

use super::ReclaimSummary;

/// Result of deleting a tag together with its images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTagOutcome {
    pub tag: String,
    pub deleted_images: usize,
    pub state: ReclaimState,
    pub reclamation: ReclaimSummary,
    pub warning: Option<String>,
}

/// Add and remove tags on many images at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTagRequest {
    pub image_ids: Vec<ImageId>,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTagOutcome {
    pub updated_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameTagOutcome {
    pub old_name: String,
    pub new_name: String,
    pub affected_images: usize,
}
