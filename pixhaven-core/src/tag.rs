//! Tag names and aggregate counts.

use crate::ValidationError;
use serde::{Deserialize, Serialize};

/// A tag and the number of images carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub count: u64,
}

/// Trim, lower-case and collapse internal whitespace.
///
/// Returns `None` when nothing is left.
pub fn normalize_tag_name(raw: &str) -> Option<String> {
    let normalized = raw
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Like [`normalize_tag_name`] but reports an empty name as a validation error.
pub fn require_tag_name(field: &str, raw: &str) -> Result<String, ValidationError> {
    normalize_tag_name(raw).ok_or_else(|| ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    })
}

/// Normalize a tag list, dropping empties and duplicates while keeping
/// first-seen order.
pub fn normalize_tag_list<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.into_iter().filter_map(|t| normalize_tag_name(t.as_ref())) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
