//! Images this client just uploaded, kept until the server lists them.
//!
//! The store is a bounded ring keyed by image id, global rather than per
//! view. Rendering a first page projects the ring through the view's filters
//! and merges the matches ahead of whatever the view already holds.

use std::collections::{HashSet, VecDeque};

use pixhaven_core::{ImageFilters, ImageId, ImageListPage, ImageRecord};

#[derive(Debug, Clone)]
pub struct ClientPredictionCache {
    capacity: usize,
    /// Oldest first.
    records: VecDeque<ImageRecord>,
}

impl ClientPredictionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.records.iter().any(|record| record.id == id)
    }

    /// Remember newly created images. A repeated id moves to the newest slot;
    /// the oldest records fall off once the ring is full.
    pub fn record<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ImageRecord>,
    {
        for record in records {
            self.records.retain(|existing| existing.id != record.id);
            self.records.push_back(record);
            while self.records.len() > self.capacity {
                if let Some(evicted) = self.records.pop_front() {
                    tracing::trace!(image_id = %evicted.id, "Prediction evicted");
                }
            }
        }
    }

    /// Predicted images a view with `filters` would contain, newest first.
    pub fn project(&self, filters: &ImageFilters) -> Vec<ImageRecord> {
        let filters = filters.normalized();
        self.records
            .iter()
            .rev()
            .filter(|record| filters.matches(record))
            .cloned()
            .collect()
    }

    /// Forget predictions the server has started returning.
    pub fn reconcile(&mut self, authoritative: &[ImageId]) -> usize {
        let seen: HashSet<ImageId> = authoritative.iter().copied().collect();
        let before = self.records.len();
        self.records.retain(|record| !seen.contains(&record.id));
        before - self.records.len()
    }

    /// Drop one prediction, returning its ring slot for [`Self::restore`].
    pub fn remove(&mut self, id: ImageId) -> Option<(usize, ImageRecord)> {
        let index = self.records.iter().position(|record| record.id == id)?;
        self.records.remove(index).map(|record| (index, record))
    }

    /// Put back a prediction taken out by [`Self::remove`].
    pub fn restore(&mut self, slot: usize, record: ImageRecord) {
        if self.contains(record.id) {
            return;
        }
        let slot = slot.min(self.records.len());
        self.records.insert(slot, record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }
}

/// Splice `predicted` ahead of a first page.
///
/// Predicted records win identity conflicts. The total grows by the number of
/// predicted records `base` did not already list, and the result is cut back
/// to the page size. Only first pages may be merged; later pages would shift.
pub fn merge_first_page(predicted: &[ImageRecord], base: &ImageListPage) -> ImageListPage {
    let base_ids: HashSet<ImageId> = base.images.iter().map(|image| image.id).collect();
    let mut merged_ids: HashSet<ImageId> = HashSet::with_capacity(predicted.len());
    let mut images: Vec<ImageRecord> = Vec::with_capacity(base.limit as usize);

    for record in predicted {
        if merged_ids.insert(record.id) {
            images.push(record.clone());
        }
    }
    let unseen = images.iter().filter(|r| !base_ids.contains(&r.id)).count() as u64;

    images.extend(
        base.images
            .iter()
            .filter(|image| !merged_ids.contains(&image.id))
            .cloned(),
    );
    images.truncate(base.limit.max(1) as usize);

    let mut page = ImageListPage {
        images,
        ..base.clone()
    };
    page.set_total(base.total + unseen);
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixhaven_core::{FormatFilter, ImageFormat, Orientation, PageRequest};
    use pixhaven_test_utils::fixtures::{image_record, image_series, tagged_image};
    use uuid::Uuid;

    #[test]
    fn test_ring_evicts_oldest_and_dedupes() {
        let mut cache = ClientPredictionCache::new(2);
        let images = image_series(3, &[]);
        cache.record(images.clone());
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(images[0].id));

        // Re-recording an id moves it to the newest slot instead of duplicating.
        cache.record([images[1].clone()]);
        assert_eq!(cache.len(), 2);
        let projected = cache.project(&ImageFilters::all());
        assert_eq!(projected[0].id, images[1].id);
    }

    #[test]
    fn test_project_applies_server_predicate() {
        let mut cache = ClientPredictionCache::new(10);
        let cat = tagged_image(&["cats"]);
        let portrait_gif = image_record(
            Uuid::now_v7(),
            Orientation::Portrait,
            ImageFormat::Gif,
            vec!["cats".to_string()],
        );
        cache.record([cat.clone(), portrait_gif.clone()]);

        let cats = cache.project(&ImageFilters::all().with_tag(" CATS "));
        assert_eq!(cats.len(), 2);
        let gifs = cache.project(&ImageFilters::all().with_format(FormatFilter::Gif));
        assert_eq!(gifs, vec![portrait_gif]);
        let landscape =
            cache.project(&ImageFilters::all().with_orientation(Orientation::Landscape));
        assert_eq!(landscape, vec![cat]);
    }

    #[test]
    fn test_merge_new_upload_into_full_first_page() {
        let existing = image_series(10, &[]);
        let mut newest_first = existing.clone();
        newest_first.reverse();
        let base = ImageListPage::new(newest_first, PageRequest::new(1, 10), 25);
        let upload = tagged_image(&[]);

        let merged = merge_first_page(&[upload.clone()], &base);
        assert_eq!(merged.images.len(), 10);
        assert_eq!(merged.images[0].id, upload.id);
        assert_eq!(merged.total, 26);
        assert_eq!(merged.total_pages, 3);
    }

    #[test]
    fn test_merge_is_stable_once_server_lists_the_upload() {
        let upload = tagged_image(&[]);
        let mut stale_copy = upload.clone();
        stale_copy.tags = vec!["old".to_string()];
        let base = ImageListPage::new(vec![stale_copy], PageRequest::new(1, 10), 1);

        let merged = merge_first_page(&[upload.clone()], &base);
        assert_eq!(merged.images, vec![upload]);
        assert_eq!(merged.total, 1);
    }

    #[test]
    fn test_merge_into_empty_view_reports_one_page() {
        let uploads = image_series(2, &[]);
        let merged = merge_first_page(&uploads, &ImageListPage::empty(PageRequest::first(24)));
        assert_eq!(merged.total, 2);
        assert_eq!(merged.total_pages, 1);
    }

    #[test]
    fn test_reconcile_and_restore() {
        let mut cache = ClientPredictionCache::new(5);
        let images = image_series(3, &[]);
        cache.record(images.clone());

        assert_eq!(cache.reconcile(&[images[0].id]), 1);
        let (slot, record) = cache.remove(images[2].id).unwrap();
        assert_eq!(cache.len(), 1);
        cache.restore(slot, record);
        assert_eq!(cache.project(&ImageFilters::all())[0].id, images[2].id);
    }
}
