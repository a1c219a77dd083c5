//! Optimistic deletes as reversible commands.
//!
//! [`OptimisticMutationCoordinator::apply_delete`] cancels in-flight list and
//! detail fetches, strips the image from every cached view and returns an
//! [`Undo`] recording exactly what it removed. Rolling back re-inserts those
//! records where they were, so two overlapping deletes can fail or succeed
//! independently without restoring each other's removals.

use pixhaven_core::{ImageId, ImageRecord};
use tracing::debug;

use crate::prediction::ClientPredictionCache;
use crate::query_cache::{CachedValue, QueryCache, QueryKey, Removal};

/// The inverse of one optimistic delete.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an Undo must be rolled back or dropped once the server answers"]
pub struct Undo {
    image_id: ImageId,
    removals: Vec<(QueryKey, Removal)>,
    detail: Option<ImageRecord>,
    prediction: Option<(usize, ImageRecord)>,
}

impl Undo {
    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    /// Collection views the delete changed.
    pub fn touched_views(&self) -> impl Iterator<Item = &QueryKey> {
        self.removals.iter().map(|(key, _)| key)
    }

    pub fn removed_detail(&self) -> bool {
        self.detail.is_some()
    }
}

pub struct OptimisticMutationCoordinator<'a> {
    cache: &'a mut QueryCache,
    predictions: &'a mut ClientPredictionCache,
}

impl<'a> OptimisticMutationCoordinator<'a> {
    pub fn new(cache: &'a mut QueryCache, predictions: &'a mut ClientPredictionCache) -> Self {
        Self { cache, predictions }
    }

    pub fn apply_delete(&mut self, id: ImageId) -> Undo {
        let detail_key = QueryKey::Image(id);
        let cancelled = self
            .cache
            .cancel_where(|key| key.is_image_list() || *key == detail_key);

        let mut removals = Vec::new();
        for key in self.cache.keys_where(QueryKey::is_image_list) {
            let holds_image = matches!(
                self.cache.get(&key),
                Some(CachedValue::Collection(view)) if view.contains(id)
            );
            if !holds_image {
                continue;
            }
            if let Some(Some(removal)) = self.cache.update_collection(&key, |view| view.remove(id))
            {
                removals.push((key, removal));
            }
        }

        let detail = match self.cache.remove(&detail_key) {
            Some(CachedValue::Image(record)) => Some(record),
            _ => None,
        };
        let prediction = self.predictions.remove(id);

        debug!(
            image_id = %id,
            cancelled_fetches = cancelled,
            views = removals.len(),
            detail = detail.is_some(),
            predicted = prediction.is_some(),
            "Optimistic delete applied"
        );
        Undo {
            image_id: id,
            removals,
            detail,
            prediction,
        }
    }

    /// Put back everything `undo` removed. Views that already show the image
    /// again are left alone.
    pub fn rollback(&mut self, undo: Undo) {
        let id = undo.image_id;
        let mut restored = 0;
        for (key, removal) in undo.removals.iter().rev() {
            if self.cache.update_collection(key, |view| view.reinsert(removal)) == Some(true) {
                restored += 1;
            }
        }
        if let Some(record) = undo.detail {
            if self.cache.image(id).is_none() {
                self.cache.set(QueryKey::Image(id), CachedValue::Image(record));
            }
        }
        if let Some((slot, record)) = undo.prediction {
            self.predictions.restore(slot, record);
        }
        debug!(image_id = %id, views = restored, "Optimistic delete rolled back");
    }
}
