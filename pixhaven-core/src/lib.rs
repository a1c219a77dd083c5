//! Pixhaven Core - Entity Types
//!
//! Pure data structures shared by the server and client crates.
//! This crate contains no I/O: records, filters, pages and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod filter;
pub mod image;
pub mod page;
pub mod tag;

pub use error::*;
pub use filter::*;
pub use image::*;
pub use page::*;
pub use tag::*;

// ============================================================================
// RESOURCE CLASSES
// ============================================================================

/// Resource class discriminator used by cache keys and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Image,
    Tag,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Image => "image",
            ResourceClass::Tag => "tag",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceClass::Image),
            "tag" => Ok(ResourceClass::Tag),
            other => Err(ValidationError::InvalidValue {
                field: "resource_class".to_string(),
                reason: format!("unknown resource class '{}'", other),
            }),
        }
    }
}
