//! Collection filters and pagination requests.
//!
//! The matching predicate here is the single definition of "does this image
//! belong in this view". The server query and the client prediction cache
//! both call [`ImageFilters::matches`].

use crate::{normalize_tag_name, ImageFormat, ImageRecord, Orientation, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest page size any caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Format facet of a collection view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFilter {
    #[default]
    All,
    Gif,
    Webp,
    Avif,
    /// Images stored without any derived representation.
    Original,
}

impl FormatFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatFilter::All => "all",
            FormatFilter::Gif => "gif",
            FormatFilter::Webp => "webp",
            FormatFilter::Avif => "avif",
            FormatFilter::Original => "original",
        }
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        match self {
            FormatFilter::All => true,
            FormatFilter::Gif => record.format == ImageFormat::Gif,
            FormatFilter::Webp => record.paths.webp.is_some(),
            FormatFilter::Avif => record.paths.avif.is_some(),
            FormatFilter::Original => {
                !record.paths.original.is_empty()
                    && record.paths.webp.is_none()
                    && record.paths.avif.is_none()
            }
        }
    }
}

impl fmt::Display for FormatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(FormatFilter::All),
            "gif" => Ok(FormatFilter::Gif),
            "webp" => Ok(FormatFilter::Webp),
            "avif" => Ok(FormatFilter::Avif),
            "original" => Ok(FormatFilter::Original),
            other => Err(ValidationError::InvalidValue {
                field: "format".to_string(),
                reason: format!("unknown format filter '{}'", other),
            }),
        }
    }
}

/// Filter facets of an image collection view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageFilters {
    pub tag: Option<String>,
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub format: FormatFilter,
}

impl ImageFilters {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl AsRef<str>) -> Self {
        self.tag = normalize_tag_name(tag.as_ref());
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_format(mut self, format: FormatFilter) -> Self {
        self.format = format;
        self
    }

    /// Canonical form: tag normalized, blank tag collapsed to `None`.
    pub fn normalized(&self) -> Self {
        Self {
            tag: self.tag.as_deref().and_then(normalize_tag_name),
            orientation: self.orientation,
            format: self.format,
        }
    }

    /// The same view without its format facet.
    pub fn without_format(&self) -> Self {
        Self {
            format: FormatFilter::All,
            ..self.normalized()
        }
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        let tag_ok = match self.tag.as_deref().and_then(normalize_tag_name) {
            Some(tag) => record.has_tag(&tag),
            None => true,
        };
        let orientation_ok = self
            .orientation
            .map(|o| o == record.orientation)
            .unwrap_or(true);
        tag_ok && orientation_ok && self.format.matches(record)
    }
}

/// Page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp `page` to at least 1 and `limit` into `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self::new(1, limit)
    }

    pub fn is_first(&self) -> bool {
        self.page == 1
    }

    pub fn next(&self) -> Self {
        Self::new(self.page.saturating_add(1), self.limit)
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.limit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{new_image_id, ImagePaths, ImageSizes};
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(format: ImageFormat, orientation: Orientation, tags: &[&str]) -> ImageRecord {
        let id = new_image_id();
        ImageRecord {
            id,
            original_name: "x".to_string(),
            upload_time: Utc::now(),
            expiry_time: None,
            orientation,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            format,
            width: 1,
            height: 1,
            paths: ImagePaths::generate(id, orientation, format),
            sizes: ImageSizes::default(),
        }
    }

    #[test]
    fn test_format_filter_matches() {
        let gif = record(ImageFormat::Gif, Orientation::Landscape, &[]);
        let png = record(ImageFormat::Png, Orientation::Landscape, &[]);

        assert!(FormatFilter::All.matches(&gif));
        assert!(FormatFilter::Gif.matches(&gif));
        assert!(!FormatFilter::Gif.matches(&png));
        assert!(FormatFilter::Webp.matches(&png));
        assert!(FormatFilter::Avif.matches(&png));
        assert!(FormatFilter::Original.matches(&gif));
        assert!(!FormatFilter::Original.matches(&png));
    }

    #[test]
    fn test_filters_match_tag_and_orientation() {
        let image = record(ImageFormat::Jpeg, Orientation::Portrait, &["cats"]);

        assert!(ImageFilters::all().matches(&image));
        assert!(ImageFilters::all().with_tag(" CATS ").matches(&image));
        assert!(!ImageFilters::all().with_tag("dogs").matches(&image));
        assert!(ImageFilters::all()
            .with_orientation(Orientation::Portrait)
            .matches(&image));
        assert!(!ImageFilters::all()
            .with_orientation(Orientation::Landscape)
            .matches(&image));
    }

    #[test]
    fn test_normalized_collapses_blank_tag() {
        let filters = ImageFilters {
            tag: Some("   ".to_string()),
            orientation: None,
            format: FormatFilter::All,
        };
        assert_eq!(filters.normalized(), ImageFilters::all());
    }

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, limit: 1 });
        assert_eq!(
            PageRequest::new(3, 500),
            PageRequest {
                page: 3,
                limit: MAX_PAGE_LIMIT
            }
        );
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_unclamped_page_zero_has_zero_offset() {
        let raw = PageRequest { page: 0, limit: 12 };
        assert_eq!(raw.offset(), 0);
    }

    proptest! {
        #[test]
        fn prop_page_request_is_always_in_range(page in any::<u32>(), limit in any::<u32>()) {
            let request = PageRequest::new(page, limit);
            prop_assert!(request.page >= 1);
            prop_assert!((1..=MAX_PAGE_LIMIT).contains(&request.limit));
            prop_assert_eq!(
                request.offset(),
                (request.page as usize - 1) * request.limit as usize
            );
        }
    }
}
