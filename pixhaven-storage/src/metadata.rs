//! Metadata store contract and in-memory implementation.
//!
//! The metadata store is the source of truth. Its query implementation is
//! external to the cache engine; only the shape of the contract matters here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use pixhaven_core::{
    normalize_tag_list, HavenResult, ImageFilters, ImageId, ImagePatch, ImageRecord, ImageRef,
    PageRequest, ResourceClass, StorageError, Tag, Timestamp,
};

/// Durable metadata store contract.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ========================================================================
    // IMAGE OPERATIONS
    // ========================================================================

    /// Insert a new image. Its tags are registered as side effect.
    async fn create_image(&self, record: &ImageRecord) -> HavenResult<()>;

    /// Get an image by ID.
    async fn get_image(&self, id: ImageId) -> HavenResult<Option<ImageRecord>>;

    /// Apply a patch. Returns the updated record, or `None` if absent.
    async fn update_image(&self, id: ImageId, patch: &ImagePatch)
        -> HavenResult<Option<ImageRecord>>;

    /// Delete an image. Returns the deleted record, or `None` if absent.
    async fn delete_image(&self, id: ImageId) -> HavenResult<Option<ImageRecord>>;

    /// One page of matching images, newest first, plus the total match count.
    async fn query_images(
        &self,
        filters: &ImageFilters,
        page: PageRequest,
    ) -> HavenResult<(Vec<ImageRecord>, u64)>;

    /// Images whose expiry is at or before `now`, oldest expiry first.
    async fn list_expired(&self, now: Timestamp, limit: usize) -> HavenResult<Vec<ImageRef>>;

    // ========================================================================
    // TAG OPERATIONS
    // ========================================================================

    /// Every known tag with its image count.
    async fn list_tags(&self) -> HavenResult<Vec<Tag>>;

    /// Register a tag. Expects a normalized name.
    async fn create_tag(&self, name: &str) -> HavenResult<Tag>;

    /// Rename a tag on every image carrying it. Returns the affected images.
    async fn rename_tag(&self, old: &str, new: &str) -> HavenResult<Vec<ImageId>>;

    /// Delete a tag and every image carrying it, atomically.
    /// Returns references to the deleted images.
    async fn delete_tag_with_images(&self, name: &str) -> HavenResult<Vec<ImageRef>>;

    /// Add then remove tags on each existing image in `ids`.
    /// Returns the images that exist and were updated.
    async fn batch_update_tags(
        &self,
        ids: &[ImageId],
        add: &[String],
        remove: &[String],
    ) -> HavenResult<Vec<ImageId>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    images: HashMap<ImageId, ImageRecord>,
    /// Registered tag names. Tags with no images remain listed.
    tags: BTreeMap<String, ()>,
}

impl Tables {
    fn register_tags(&mut self, tags: &[String]) {
        for tag in tags {
            self.tags.entry(tag.clone()).or_insert(());
        }
    }

    fn tag_count(&self, name: &str) -> u64 {
        self.images.values().filter(|i| i.has_tag(name)).count() as u64
    }
}

/// In-memory metadata store for tests and local development.
///
/// One lock guards every table so cascades are atomic.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetadataStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }

    /// Number of stored images.
    pub fn image_count(&self) -> usize {
        self.read().map(|t| t.images.len()).unwrap_or(0)
    }

    /// Remove all data.
    pub fn clear(&self) -> HavenResult<()> {
        let mut tables = self.write()?;
        tables.images.clear();
        tables.tags.clear();
        Ok(())
    }
}

fn not_found(class: ResourceClass, id: impl ToString) -> StorageError {
    StorageError::NotFound {
        class,
        id: id.to_string(),
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_image(&self, record: &ImageRecord) -> HavenResult<()> {
        let mut tables = self.write()?;
        if tables.images.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                class: ResourceClass::Image,
                id: record.id.to_string(),
            }
            .into());
        }
        let mut record = record.clone();
        record.tags = normalize_tag_list(&record.tags);
        tables.register_tags(&record.tags);
        tables.images.insert(record.id, record);
        Ok(())
    }

    async fn get_image(&self, id: ImageId) -> HavenResult<Option<ImageRecord>> {
        Ok(self.read()?.images.get(&id).cloned())
    }

    async fn update_image(
        &self,
        id: ImageId,
        patch: &ImagePatch,
    ) -> HavenResult<Option<ImageRecord>> {
        let mut tables = self.write()?;
        let updated = match tables.images.get_mut(&id) {
            Some(record) => {
                patch.apply_to(record);
                record.clone()
            }
            None => return Ok(None),
        };
        tables.register_tags(&updated.tags);
        Ok(Some(updated))
    }

    async fn delete_image(&self, id: ImageId) -> HavenResult<Option<ImageRecord>> {
        Ok(self.write()?.images.remove(&id))
    }

    async fn query_images(
        &self,
        filters: &ImageFilters,
        page: PageRequest,
    ) -> HavenResult<(Vec<ImageRecord>, u64)> {
        let tables = self.read()?;
        let filters = filters.normalized();
        let mut matching: Vec<&ImageRecord> =
            tables.images.values().filter(|i| filters.matches(i)).collect();
        matching.sort_by(|a, b| a.gallery_order(b));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn list_expired(&self, now: Timestamp, limit: usize) -> HavenResult<Vec<ImageRef>> {
        let tables = self.read()?;
        let mut expired: Vec<&ImageRecord> =
            tables.images.values().filter(|i| i.is_expired(now)).collect();
        expired.sort_by_key(|i| i.expiry_time);
        Ok(expired.into_iter().take(limit).map(ImageRecord::to_ref).collect())
    }

    async fn list_tags(&self) -> HavenResult<Vec<Tag>> {
        let tables = self.read()?;
        Ok(tables
            .tags
            .keys()
            .map(|name| Tag {
                name: name.clone(),
                count: tables.tag_count(name),
            })
            .collect())
    }

    async fn create_tag(&self, name: &str) -> HavenResult<Tag> {
        let mut tables = self.write()?;
        if tables.tags.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                class: ResourceClass::Tag,
                id: name.to_string(),
            }
            .into());
        }
        tables.tags.insert(name.to_string(), ());
        Ok(Tag {
            name: name.to_string(),
            count: tables.tag_count(name),
        })
    }

    async fn rename_tag(&self, old: &str, new: &str) -> HavenResult<Vec<ImageId>> {
        let mut tables = self.write()?;
        if !tables.tags.contains_key(old) {
            return Err(not_found(ResourceClass::Tag, old).into());
        }
        if tables.tags.contains_key(new) {
            return Err(StorageError::AlreadyExists {
                class: ResourceClass::Tag,
                id: new.to_string(),
            }
            .into());
        }

        let mut affected = Vec::new();
        for record in tables.images.values_mut() {
            if let Some(slot) = record.tags.iter_mut().find(|t| t.as_str() == old) {
                *slot = new.to_string();
                affected.push(record.id);
            }
        }
        tables.tags.remove(old);
        tables.tags.insert(new.to_string(), ());
        Ok(affected)
    }

    async fn delete_tag_with_images(&self, name: &str) -> HavenResult<Vec<ImageRef>> {
        let mut tables = self.write()?;
        let doomed: Vec<ImageId> = tables
            .images
            .values()
            .filter(|i| i.has_tag(name))
            .map(|i| i.id)
            .collect();
        if !tables.tags.contains_key(name) && doomed.is_empty() {
            return Err(not_found(ResourceClass::Tag, name).into());
        }

        let refs = doomed
            .iter()
            .filter_map(|id| tables.images.remove(id))
            .map(|record| record.to_ref())
            .collect();
        tables.tags.remove(name);
        Ok(refs)
    }

    async fn batch_update_tags(
        &self,
        ids: &[ImageId],
        add: &[String],
        remove: &[String],
    ) -> HavenResult<Vec<ImageId>> {
        let mut tables = self.write()?;
        let add = normalize_tag_list(add);
        let remove = normalize_tag_list(remove);

        let mut updated = Vec::new();
        for id in ids {
            let Some(record) = tables.images.get_mut(id) else {
                continue;
            };
            let mut tags = record.tags.clone();
            tags.extend(add.iter().cloned());
            tags.retain(|t| !remove.contains(t));
            record.tags = normalize_tag_list(tags);
            if !updated.contains(id) {
                updated.push(*id);
            }
        }
        if !updated.is_empty() {
            tables.register_tags(&add);
        }
        Ok(updated)
    }
}
