//! Service Request and Response Types
//!
//! Plain DTOs passed to and returned from the service layer. The routing
//! layer that parses these from HTTP is external.

// Image types
mod image;
pub use image::*;

// Tag types
mod tag;
pub use tag::*;
