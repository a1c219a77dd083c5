//! pixhaven Test Utilities
//!
//! Shared test infrastructure for the pixhaven workspace:
//! - Proptest generators for images, filters and pages
//! - Fixtures for common records
//! - Fault-injecting cache and blob store fakes
//! - Assertions on the error taxonomy

pub use pixhaven_core::{
    FormatFilter, HavenError, HavenResult, ImageFilters, ImageFormat, ImageId, ImagePaths,
    ImageRecord, ImageSizes, Orientation, PageRequest, StorageError, Timestamp,
};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pixhaven_core::{BlobError, CacheError};
use pixhaven_storage::{
    BlobStore, CacheKey, CacheStats, CacheTransport, InMemoryBlobStore, InMemoryCacheTransport,
    KeyPattern,
};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for pixhaven domain types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid UUIDv7.
    pub fn arb_image_id() -> impl Strategy<Value = ImageId> {
        Just(()).prop_map(|_| Uuid::now_v7())
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_orientation() -> impl Strategy<Value = Orientation> {
        prop_oneof![Just(Orientation::Landscape), Just(Orientation::Portrait)]
    }

    pub fn arb_image_format() -> impl Strategy<Value = ImageFormat> {
        prop_oneof![
            Just(ImageFormat::Jpeg),
            Just(ImageFormat::Png),
            Just(ImageFormat::Gif),
            Just(ImageFormat::Webp),
            Just(ImageFormat::Avif),
        ]
    }

    pub fn arb_format_filter() -> impl Strategy<Value = FormatFilter> {
        prop_oneof![
            Just(FormatFilter::All),
            Just(FormatFilter::Gif),
            Just(FormatFilter::Webp),
            Just(FormatFilter::Avif),
            Just(FormatFilter::Original),
        ]
    }

    /// Generate a normalized tag name from a small vocabulary, so generated
    /// records and filters overlap often.
    pub fn arb_tag_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["cats", "dogs", "sunset", "city night", "macro"])
            .prop_map(str::to_string)
    }

    pub fn arb_tag_list() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(arb_tag_name(), 0..3).prop_map(|set| set.into_iter().collect())
    }

    pub fn arb_image_filters() -> impl Strategy<Value = ImageFilters> {
        (
            prop::option::of(arb_tag_name()),
            prop::option::of(arb_orientation()),
            arb_format_filter(),
        )
            .prop_map(|(tag, orientation, format)| ImageFilters {
                tag,
                orientation,
                format,
            })
    }

    pub fn arb_page_request() -> impl Strategy<Value = PageRequest> {
        (1u32..6, 1u32..=30).prop_map(|(page, limit)| PageRequest::new(page, limit))
    }

    /// Generate an ImageRecord with consistent paths for its format.
    pub fn arb_image_record() -> impl Strategy<Value = ImageRecord> {
        (
            arb_image_id(),
            arb_orientation(),
            arb_image_format(),
            arb_tag_list(),
            arb_timestamp(),
            any::<bool>(),
        )
            .prop_map(|(id, orientation, format, tags, upload_time, strip_derived)| {
                let mut record = fixtures::image_record(id, orientation, format, tags);
                record.upload_time = upload_time;
                if strip_derived {
                    record.paths.webp = None;
                    record.paths.avif = None;
                }
                record
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made records and helpers.

    use super::*;
    use pixhaven_core::normalize_tag_list;

    /// A record with generated paths and plausible sizes.
    pub fn image_record(
        id: ImageId,
        orientation: Orientation,
        format: ImageFormat,
        tags: Vec<String>,
    ) -> ImageRecord {
        let (width, height) = match orientation {
            Orientation::Landscape => (1920, 1080),
            Orientation::Portrait => (1080, 1920),
        };
        let paths = ImagePaths::generate(id, orientation, format);
        ImageRecord {
            id,
            original_name: format!("{}.{}", id, format.extension()),
            upload_time: Utc::now(),
            expiry_time: None,
            orientation,
            tags: normalize_tag_list(tags),
            format,
            width,
            height,
            sizes: ImageSizes {
                original: 4096,
                webp: if paths.webp.is_some() { 2048 } else { 0 },
                avif: if paths.avif.is_some() { 1024 } else { 0 },
            },
            paths,
        }
    }

    /// A landscape JPEG with the given tags.
    pub fn tagged_image(tags: &[&str]) -> ImageRecord {
        image_record(
            Uuid::now_v7(),
            Orientation::Landscape,
            ImageFormat::Jpeg,
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    /// `count` landscape JPEGs with strictly increasing upload times, oldest
    /// first, all carrying `tags`.
    pub fn image_series(count: usize, tags: &[&str]) -> Vec<ImageRecord> {
        let base = Utc::now() - chrono::Duration::hours(1);
        (0..count)
            .map(|i| {
                let mut record = tagged_image(tags);
                record.upload_time = base + chrono::Duration::seconds(i as i64);
                record
            })
            .collect()
    }

    /// Write placeholder bytes for every blob key of `record`.
    pub async fn store_blobs(blobs: &dyn BlobStore, record: &ImageRecord) {
        for key in record.paths.blob_keys() {
            // In-memory puts cannot fail; fakes that fail are opt-in.
            let _ = blobs.put(&key, vec![0u8; 8], "application/octet-stream").await;
        }
    }
}

// ============================================================================
// FAULT-INJECTING FAKES
// ============================================================================

pub mod fakes {
    //! Cache and blob store fakes whose failures can be switched on and off.

    use super::*;

    fn transport_error(operation: &'static str, key: &str) -> CacheError {
        CacheError::Transport {
            operation,
            key: key.to_string(),
            reason: "injected failure".to_string(),
        }
    }

    /// In-memory cache transport with switchable read, write and delete failures.
    #[derive(Debug, Default)]
    pub struct FlakyCacheTransport {
        inner: InMemoryCacheTransport,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        fail_deletes: AtomicBool,
        injected: AtomicU64,
    }

    impl FlakyCacheTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn inner(&self) -> &InMemoryCacheTransport {
            &self.inner
        }

        pub fn fail_reads(&self, on: bool) {
            self.fail_reads.store(on, Ordering::SeqCst);
        }

        pub fn fail_writes(&self, on: bool) {
            self.fail_writes.store(on, Ordering::SeqCst);
        }

        pub fn fail_deletes(&self, on: bool) {
            self.fail_deletes.store(on, Ordering::SeqCst);
        }

        /// Number of operations that failed on purpose.
        pub fn injected_failures(&self) -> u64 {
            self.injected.load(Ordering::SeqCst)
        }

        fn tripped(&self, flag: &AtomicBool) -> bool {
            let on = flag.load(Ordering::SeqCst);
            if on {
                self.injected.fetch_add(1, Ordering::SeqCst);
            }
            on
        }
    }

    #[async_trait]
    impl CacheTransport for FlakyCacheTransport {
        async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
            if self.tripped(&self.fail_reads) {
                return Err(transport_error("get", key.as_str()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
            if self.tripped(&self.fail_writes) {
                return Err(transport_error("set", key.as_str()));
            }
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
            if self.tripped(&self.fail_deletes) {
                return Err(transport_error("delete", key.as_str()));
            }
            self.inner.delete(key).await
        }

        async fn delete_by_prefix(&self, pattern: &KeyPattern) -> Result<u64, CacheError> {
            if self.tripped(&self.fail_deletes) {
                return Err(transport_error("delete_by_prefix", pattern.as_str()));
            }
            self.inner.delete_by_prefix(pattern).await
        }

        async fn stats(&self) -> Result<CacheStats, CacheError> {
            self.inner.stats().await
        }
    }

    /// In-memory blob store with switchable put and delete failures.
    ///
    /// `fail_puts_matching` fails only puts whose key contains the pattern.
    #[derive(Debug, Default)]
    pub struct FaultyBlobStore {
        inner: InMemoryBlobStore,
        fail_deletes: AtomicBool,
        put_failure_pattern: std::sync::Mutex<Option<String>>,
    }

    impl FaultyBlobStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn inner(&self) -> &InMemoryBlobStore {
            &self.inner
        }

        pub fn fail_deletes(&self, on: bool) {
            self.fail_deletes.store(on, Ordering::SeqCst);
        }

        pub fn fail_puts_matching(&self, pattern: Option<&str>) {
            if let Ok(mut slot) = self.put_failure_pattern.lock() {
                *slot = pattern.map(str::to_string);
            }
        }

        fn put_should_fail(&self, key: &str) -> bool {
            self.put_failure_pattern
                .lock()
                .map(|slot| slot.as_deref().map(|p| key.contains(p)).unwrap_or(false))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl BlobStore for FaultyBlobStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
            if self.put_should_fail(key) {
                return Err(BlobError::PutFailed {
                    key: key.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.inner.put(key, bytes, content_type).await
        }

        async fn delete(&self, key: &str) -> Result<(), BlobError> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(BlobError::DeleteFailed {
                    key: key.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.inner.delete(key).await
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on pixhaven results.

    use super::*;
    use pixhaven_core::ResourceClass;

    /// Assert that a HavenResult is a NotFound storage error for `class`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &HavenResult<T>, class: ResourceClass) {
        match result {
            Err(HavenError::Storage(StorageError::NotFound { class: c, .. })) => {
                assert_eq!(*c, class, "Wrong resource class in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", class, other),
        }
    }

    /// Assert that `images` is ordered newest first.
    #[track_caller]
    pub fn assert_newest_first(images: &[ImageRecord]) {
        for pair in images.windows(2) {
            assert!(
                pair[0].upload_time >= pair[1].upload_time,
                "{} uploaded before {}",
                pair[0].id,
                pair[1].id
            );
        }
    }
}
