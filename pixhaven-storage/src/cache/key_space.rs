//! Deterministic cache-key construction.
//!
//! Keys are plain strings laid out as
//! `{namespace}:{version}:{class}:{kind}:{params}` so that every collection key
//! of one resource class shares a single prefix. That prefix is what the
//! invalidation router purges.
//!
//! Collection parameters are canonicalized before they reach the key: absent
//! facets become `*`, string facets are normalized then hashed, page numbers
//! and sizes are clamped. Two requests for the same semantic query always
//! produce the same key.

use pixhaven_core::{ImageFilters, PageRequest, ResourceClass};
use sha2::{Digest, Sha256};
use std::fmt;

/// Layout version baked into every key. Bumping it orphans all old entries.
pub const KEY_VERSION: &str = "v1";

/// Token used for an absent filter facet.
pub const WILDCARD: &str = "*";

/// An exact cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, pattern: &KeyPattern) -> bool {
        self.0.starts_with(pattern.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key prefix covering a family of keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPattern(String);

impl KeyPattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*", self.0)
    }
}

/// Identity of a cached collection query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionQuery {
    /// One page of the image gallery.
    Images {
        filters: ImageFilters,
        page: PageRequest,
    },
    /// The tag list with aggregate counts.
    Tags,
}

impl CollectionQuery {
    pub fn images(filters: &ImageFilters, page: PageRequest) -> Self {
        CollectionQuery::Images {
            filters: filters.normalized(),
            page: PageRequest::new(page.page, page.limit),
        }
    }

    pub fn resource_class(&self) -> ResourceClass {
        match self {
            CollectionQuery::Images { .. } => ResourceClass::Image,
            CollectionQuery::Tags => ResourceClass::Tag,
        }
    }
}

/// Builds every cache key used by the server.
///
/// The namespace isolates deployments (or tests) that share one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("pixhaven")
    }
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn class_root(&self, class: ResourceClass) -> String {
        format!("{}:{}:{}", self.namespace, KEY_VERSION, class)
    }

    /// Key for one entity's detail payload.
    pub fn make_entity_key(&self, class: ResourceClass, id: impl fmt::Display) -> CacheKey {
        CacheKey(format!("{}:entity:{}", self.class_root(class), id))
    }

    /// Key for one collection query.
    pub fn make_collection_key(&self, query: &CollectionQuery) -> CacheKey {
        let prefix = self.collection_prefix(query.resource_class());
        let params = match query {
            CollectionQuery::Images { filters, page } => {
                let filters = filters.normalized();
                let page = PageRequest::new(page.page, page.limit);
                let tag = filters
                    .tag
                    .as_deref()
                    .map(fingerprint)
                    .unwrap_or_else(|| WILDCARD.to_string());
                let orientation = filters
                    .orientation
                    .map(|o| o.as_str())
                    .unwrap_or(WILDCARD);
                format!(
                    "page={}:limit={}:tag={}:orientation={}:format={}",
                    page.page, page.limit, tag, orientation, filters.format
                )
            }
            CollectionQuery::Tags => "all".to_string(),
        };
        CacheKey(format!("{}{}", prefix.0, params))
    }

    /// Prefix shared by every collection key of `class`.
    pub fn collection_prefix(&self, class: ResourceClass) -> KeyPattern {
        KeyPattern(format!("{}:list:", self.class_root(class)))
    }
}

/// Hex SHA-256 of an already-normalized string facet.
fn fingerprint(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixhaven_core::{FormatFilter, Orientation};
    use uuid::Uuid;

    #[test]
    fn test_entity_key_layout() {
        let keys = KeySpace::default();
        let id = Uuid::nil();
        assert_eq!(
            keys.make_entity_key(ResourceClass::Image, id).as_str(),
            "pixhaven:v1:image:entity:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_absent_facets_use_wildcard() {
        let keys = KeySpace::default();
        let key = keys.make_collection_key(&CollectionQuery::images(
            &ImageFilters::all(),
            PageRequest::new(1, 12),
        ));
        assert_eq!(
            key.as_str(),
            "pixhaven:v1:image:list:page=1:limit=12:tag=*:orientation=*:format=all"
        );
    }

    #[test]
    fn test_tag_is_normalized_before_hashing() {
        let keys = KeySpace::default();
        let a = keys.make_collection_key(&CollectionQuery::Images {
            filters: ImageFilters {
                tag: Some("  Sleepy   CATS ".to_string()),
                orientation: Some(Orientation::Portrait),
                format: FormatFilter::Webp,
            },
            page: PageRequest { page: 2, limit: 24 },
        });
        let b = keys.make_collection_key(&CollectionQuery::images(
            &ImageFilters::all()
                .with_tag("sleepy cats")
                .with_orientation(Orientation::Portrait)
                .with_format(FormatFilter::Webp),
            PageRequest::new(2, 24),
        ));
        assert_eq!(a, b);
        assert!(!a.as_str().contains("sleepy"));
    }

    #[test]
    fn test_unclamped_page_request_normalizes() {
        let keys = KeySpace::default();
        let raw = keys.make_collection_key(&CollectionQuery::Images {
            filters: ImageFilters::all(),
            page: PageRequest { page: 0, limit: 1000 },
        });
        let clamped = keys.make_collection_key(&CollectionQuery::images(
            &ImageFilters::all(),
            PageRequest::new(1, 100),
        ));
        assert_eq!(raw, clamped);
    }

    #[test]
    fn test_collection_keys_share_class_prefix() {
        let keys = KeySpace::default();
        let image_prefix = keys.collection_prefix(ResourceClass::Image);
        let tag_prefix = keys.collection_prefix(ResourceClass::Tag);

        let list = keys.make_collection_key(&CollectionQuery::images(
            &ImageFilters::all().with_tag("cats"),
            PageRequest::new(3, 10),
        ));
        let tags = keys.make_collection_key(&CollectionQuery::Tags);
        let detail = keys.make_entity_key(ResourceClass::Image, Uuid::nil());

        assert!(list.matches(&image_prefix));
        assert!(!list.matches(&tag_prefix));
        assert!(tags.matches(&tag_prefix));
        assert!(!detail.matches(&image_prefix));
    }

    #[test]
    fn test_namespaces_isolate_keys() {
        let a = KeySpace::new("a");
        let b = KeySpace::new("b");
        let key = a.make_collection_key(&CollectionQuery::Tags);
        assert!(!key.matches(&b.collection_prefix(ResourceClass::Tag)));
    }

    #[test]
    fn test_distinct_filters_distinct_keys() {
        let keys = KeySpace::default();
        let page = PageRequest::new(1, 12);
        let variants = [
            ImageFilters::all(),
            ImageFilters::all().with_tag("cats"),
            ImageFilters::all().with_tag("dogs"),
            ImageFilters::all().with_orientation(Orientation::Landscape),
            ImageFilters::all().with_format(FormatFilter::Gif),
        ];
        let mut seen = std::collections::HashSet::new();
        for filters in &variants {
            assert!(seen.insert(keys.make_collection_key(&CollectionQuery::images(filters, page))));
        }
    }
}
