//! Service Layer
//!
//! Every operation follows the same order: metadata write, cache purge
//! (must succeed), blob reclamation for deletes, then the response. Reads go
//! through the read-through cache and fall back to the metadata store.

mod image_service;
mod tag_service;
mod upload_service;

pub use image_service::*;
pub use tag_service::*;
pub use upload_service::*;
