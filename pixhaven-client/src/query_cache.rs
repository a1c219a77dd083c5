//! Client query cache.
//!
//! One entry per [`QueryKey`]. Every write bumps the entry's revision. Fetches
//! run against a [`FetchTicket`]; a response is applied only while its ticket
//! is still the entry's current one, so cancelling a fetch before a local
//! mutation guarantees the late response is dropped.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use pixhaven_core::{FormatFilter, ImageFilters, ImageId, ImageListPage, ImageRecord, PageRequest, Tag};

// ============================================================================
// KEYS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListMode {
    Paginated { page: u32 },
    /// Pages accumulate as the user scrolls.
    Infinite,
}

/// A gallery view: normalized filters, page size and paging mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub filters: ImageFilters,
    pub limit: u32,
    pub mode: ListMode,
}

impl ListQuery {
    pub fn paginated(filters: &ImageFilters, page: u32, limit: u32) -> Self {
        let request = PageRequest::new(page, limit);
        Self {
            filters: filters.normalized(),
            limit: request.limit,
            mode: ListMode::Paginated { page: request.page },
        }
    }

    pub fn infinite(filters: &ImageFilters, limit: u32) -> Self {
        Self {
            filters: filters.normalized(),
            limit: PageRequest::first(limit).limit,
            mode: ListMode::Infinite,
        }
    }

    /// The page a plain load of this view fetches.
    pub fn page_request(&self) -> PageRequest {
        match self.mode {
            ListMode::Paginated { page } => PageRequest::new(page, self.limit),
            ListMode::Infinite => PageRequest::first(self.limit),
        }
    }

    /// Whether this view begins at the newest image.
    pub fn is_first_page(&self) -> bool {
        self.page_request().is_first()
    }

    /// The same view with the format facet dropped, if it had one.
    pub fn format_sibling(&self) -> Option<ListQuery> {
        if self.filters.format == FormatFilter::All {
            return None;
        }
        Some(Self {
            filters: self.filters.without_format(),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Images(ListQuery),
    Image(ImageId),
    Tags,
}

impl QueryKey {
    pub fn is_image_list(&self) -> bool {
        matches!(self, QueryKey::Images(_))
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// Where a removed image sat, so it can be put back.
///
/// Neighbours are kept by id rather than index: other removals may have
/// shifted the page by the time this one is undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub page_index: usize,
    pub position: usize,
    /// Ids that preceded the record on its page.
    pub before: Vec<ImageId>,
    /// Ids that followed it.
    pub after: Vec<ImageId>,
    pub record: ImageRecord,
}

impl Removal {
    /// Index in `images` that puts the record back between its surviving
    /// neighbours. Records it never saw are ordered by gallery order.
    pub fn slot_in(&self, images: &[ImageRecord]) -> usize {
        let lower = images
            .iter()
            .rposition(|image| self.before.contains(&image.id))
            .map_or(0, |index| index + 1);
        let upper = images
            .iter()
            .position(|image| self.after.contains(&image.id))
            .unwrap_or(images.len())
            .max(lower);
        images[lower..upper]
            .iter()
            .position(|image| self.record.gallery_order(image) == Ordering::Less)
            .map_or(upper, |offset| lower + offset)
    }
}

/// A cached collection, tagged by paging mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionView {
    Paginated(ImageListPage),
    /// Pages in load order, first page first.
    Infinite(Vec<ImageListPage>),
}

impl CollectionView {
    pub fn pages(&self) -> &[ImageListPage] {
        match self {
            CollectionView::Paginated(page) => std::slice::from_ref(page),
            CollectionView::Infinite(pages) => pages,
        }
    }

    fn pages_mut(&mut self) -> &mut [ImageListPage] {
        match self {
            CollectionView::Paginated(page) => std::slice::from_mut(page),
            CollectionView::Infinite(pages) => pages,
        }
    }

    pub fn first_page(&self) -> Option<&ImageListPage> {
        self.pages().first()
    }

    pub fn first_page_mut(&mut self) -> Option<&mut ImageListPage> {
        self.pages_mut().first_mut()
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.pages().iter().flat_map(|page| page.images.iter())
    }

    pub fn ids(&self) -> Vec<ImageId> {
        self.images().map(|image| image.id).collect()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images().any(|image| image.id == id)
    }

    pub fn total(&self) -> u64 {
        self.first_page().map(|page| page.total).unwrap_or(0)
    }

    pub fn total_pages(&self) -> u64 {
        self.first_page().map(|page| page.total_pages).unwrap_or(0)
    }

    /// Whether an infinite view has pages left to load.
    pub fn has_more(&self) -> bool {
        self.pages()
            .last()
            .map(|page| u64::from(page.page) < page.total_pages)
            .unwrap_or(false)
    }

    /// Remove `id` and count it out of every page's total.
    pub fn remove(&mut self, id: ImageId) -> Option<Removal> {
        let pages = self.pages_mut();
        let (page_index, (position, record)) = pages
            .iter_mut()
            .enumerate()
            .find_map(|(index, page)| page.remove(id).map(|removed| (index, removed)))?;
        let (before, after) = pages[page_index].images.split_at(position);
        let before = before.iter().map(|image| image.id).collect();
        let after = after.iter().map(|image| image.id).collect();
        for page in pages.iter_mut() {
            page.set_total(page.total.saturating_sub(1));
        }
        Some(Removal {
            page_index,
            position,
            before,
            after,
            record,
        })
    }

    /// Undo [`CollectionView::remove`]. A no-op when the image is already back.
    pub fn reinsert(&mut self, removal: &Removal) -> bool {
        if self.contains(removal.record.id) {
            return false;
        }
        let pages = self.pages_mut();
        let Some(target) = pages.len().checked_sub(1).map(|last| removal.page_index.min(last))
        else {
            return false;
        };
        for page in pages.iter_mut() {
            page.set_total(page.total + 1);
        }
        let page = &mut pages[target];
        let slot = removal.slot_in(&page.images);
        page.images.insert(slot, removal.record.clone());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Collection(CollectionView),
    Image(ImageRecord),
    Tags(Vec<Tag>),
}

// ============================================================================
// CACHE
// ============================================================================

/// A fetch in progress for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: QueryKey,
    generation: u64,
}

#[derive(Debug, Default)]
struct Entry {
    value: Option<CachedValue>,
    revision: u64,
    updated_at: Option<Instant>,
    stale: bool,
    in_flight: Option<u64>,
}

impl Entry {
    fn write(&mut self, value: Option<CachedValue>) {
        self.value = value;
        self.revision += 1;
        self.updated_at = Some(Instant::now());
        self.stale = false;
    }
}

#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Entry>,
    next_generation: u64,
    stale_after: Duration,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
            stale_after,
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CachedValue> {
        self.entries.get(key).and_then(|entry| entry.value.as_ref())
    }

    pub fn collection(&self, query: &ListQuery) -> Option<&CollectionView> {
        match self.get(&QueryKey::Images(query.clone())) {
            Some(CachedValue::Collection(view)) => Some(view),
            _ => None,
        }
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageRecord> {
        match self.get(&QueryKey::Image(id)) {
            Some(CachedValue::Image(record)) => Some(record),
            _ => None,
        }
    }

    /// Number of writes applied to `key`, including removals.
    pub fn revision(&self, key: &QueryKey) -> u64 {
        self.entries.get(key).map(|entry| entry.revision).unwrap_or(0)
    }

    /// Present, not marked stale, and younger than the stale window.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|entry| {
            entry.value.is_some()
                && !entry.stale
                && entry
                    .updated_at
                    .is_some_and(|at| at.elapsed() < self.stale_after)
        })
    }

    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn set(&mut self, key: QueryKey, value: CachedValue) {
        self.entries.entry(key).or_default().write(Some(value));
    }

    pub fn remove(&mut self, key: &QueryKey) -> Option<CachedValue> {
        let entry = self.entries.get_mut(key)?;
        let previous = entry.value.take();
        if previous.is_some() {
            entry.write(None);
        }
        previous
    }

    /// Edit a cached collection in place. `None` when the view is not cached.
    pub fn update_collection<R>(
        &mut self,
        key: &QueryKey,
        edit: impl FnOnce(&mut CollectionView) -> R,
    ) -> Option<R> {
        let entry = self.entries.get_mut(key)?;
        let Some(CachedValue::Collection(view)) = entry.value.as_mut() else {
            return None;
        };
        let result = edit(view);
        entry.revision += 1;
        Some(result)
    }

    /// Keys with a value that satisfy `pred`.
    pub fn keys_where(&self, pred: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|(key, entry)| entry.value.is_some() && pred(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn mark_stale_where(&mut self, pred: impl Fn(&QueryKey) -> bool) -> usize {
        let mut marked = 0;
        for (key, entry) in self.entries.iter_mut() {
            if pred(key) && entry.value.is_some() {
                entry.stale = true;
                marked += 1;
            }
        }
        marked
    }

    /// Start a fetch for `key`, superseding any fetch already running.
    pub fn begin_fetch(&mut self, key: QueryKey) -> FetchTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.entry(key.clone()).or_default().in_flight = Some(generation);
        FetchTicket { key, generation }
    }

    /// Apply a fetched value if `ticket` is still current.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, value: CachedValue) -> bool {
        let Some(entry) = self.entries.get_mut(&ticket.key) else {
            return false;
        };
        if entry.in_flight != Some(ticket.generation) {
            tracing::debug!(key = ?ticket.key, "Dropping superseded fetch response");
            return false;
        }
        entry.in_flight = None;
        entry.write(Some(value));
        true
    }

    /// Release a ticket whose fetch failed, without touching the value.
    pub fn abandon_fetch(&mut self, ticket: &FetchTicket) {
        if let Some(entry) = self.entries.get_mut(&ticket.key) {
            if entry.in_flight == Some(ticket.generation) {
                entry.in_flight = None;
            }
        }
    }

    /// Cancel in-flight fetches for every key satisfying `pred`.
    pub fn cancel_where(&mut self, pred: impl Fn(&QueryKey) -> bool) -> usize {
        let mut cancelled = 0;
        for (key, entry) in self.entries.iter_mut() {
            if pred(key) && entry.in_flight.take().is_some() {
                cancelled += 1;
            }
        }
        cancelled
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_STALE_AFTER_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixhaven_test_utils::fixtures::image_series;

    fn page_of(images: Vec<ImageRecord>, page: u32, limit: u32, total: u64) -> ImageListPage {
        ImageListPage::new(images, PageRequest::new(page, limit), total)
    }

    #[test]
    fn test_list_query_normalizes_filters() {
        let a = ListQuery::paginated(&ImageFilters::all().with_tag("  Cats "), 0, 500);
        let b = ListQuery::paginated(&ImageFilters::all().with_tag("cats"), 1, 100);
        assert_eq!(a, b);
        assert!(a.is_first_page());
        assert!(a.format_sibling().is_none());

        let webp = ListQuery::infinite(
            &ImageFilters::all().with_format(FormatFilter::Webp),
            24,
        );
        assert_eq!(
            webp.format_sibling().map(|q| q.filters.format),
            Some(FormatFilter::All)
        );
    }

    #[test]
    fn test_late_response_after_new_fetch_is_dropped() {
        let mut cache = QueryCache::default();
        let key = QueryKey::Tags;
        let first = cache.begin_fetch(key.clone());
        let second = cache.begin_fetch(key.clone());

        assert!(cache.complete_fetch(&second, CachedValue::Tags(vec![])));
        assert!(!cache.complete_fetch(&first, CachedValue::Tags(vec![Tag {
            name: "stale".to_string(),
            count: 1
        }])));
        assert_eq!(cache.get(&key), Some(&CachedValue::Tags(vec![])));
        assert_eq!(cache.revision(&key), 1);
    }

    #[test]
    fn test_cancel_blocks_in_flight_response() {
        let mut cache = QueryCache::default();
        let key = QueryKey::Tags;
        let ticket = cache.begin_fetch(key.clone());
        assert!(cache.is_in_flight(&key));

        assert_eq!(cache.cancel_where(|k| *k == QueryKey::Tags), 1);
        assert!(!cache.complete_fetch(&ticket, CachedValue::Tags(vec![])));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_freshness_and_staleness() {
        let mut cache = QueryCache::default();
        cache.set(QueryKey::Tags, CachedValue::Tags(vec![]));
        assert!(cache.is_fresh(&QueryKey::Tags));
        assert_eq!(cache.mark_stale_where(|k| *k == QueryKey::Tags), 1);
        assert!(!cache.is_fresh(&QueryKey::Tags));

        let expired = QueryCache::new(Duration::ZERO);
        assert!(!expired.is_fresh(&QueryKey::Tags));
    }

    #[test]
    fn test_remove_and_reinsert_across_infinite_pages() {
        let images = image_series(4, &[]);
        let mut view = CollectionView::Infinite(vec![
            page_of(images[..2].to_vec(), 1, 2, 4),
            page_of(images[2..].to_vec(), 2, 2, 4),
        ]);
        let before = view.clone();

        let removal = view.remove(images[2].id).unwrap();
        assert_eq!((removal.page_index, removal.position), (1, 0));
        assert!(view.pages().iter().all(|page| page.total == 3));
        assert_eq!(view.total_pages(), 2);

        assert!(view.reinsert(&removal));
        assert_eq!(view, before);
        assert!(!view.reinsert(&removal));
    }

    #[test]
    fn test_reinsert_finds_neighbours_after_other_removals() {
        let mut images = image_series(4, &[]);
        images.reverse();
        let ids: Vec<ImageId> = images.iter().map(|image| image.id).collect();
        let mut view = CollectionView::Paginated(page_of(images, 1, 10, 4));

        let second = view.remove(ids[1]).unwrap();
        let first = view.remove(ids[0]).unwrap();
        assert_eq!(view.ids(), vec![ids[2], ids[3]]);

        // Undo out of order: the older removal comes back first.
        assert!(view.reinsert(&second));
        assert_eq!(view.ids(), vec![ids[1], ids[2], ids[3]]);
        assert!(view.reinsert(&first));
        assert_eq!(view.ids(), ids);
        assert_eq!(view.total(), 4);
    }

    #[test]
    fn test_slot_falls_back_to_gallery_order() {
        let mut images = image_series(3, &[]);
        images.reverse();
        let (x, a, b) = (images[0].clone(), images[1].clone(), images[2].clone());
        let removal = Removal {
            page_index: 0,
            position: 1,
            before: vec![x.id],
            after: vec![],
            record: b,
        };
        // `a` is unknown to the removal but newer, so it stays ahead.
        assert_eq!(removal.slot_in(&[x.clone(), a]), 2);
        assert_eq!(removal.slot_in(&[x]), 1);
        assert_eq!(removal.slot_in(&[]), 0);
    }

    #[test]
    fn test_has_more() {
        let images = image_series(2, &[]);
        let view = CollectionView::Infinite(vec![page_of(images, 1, 2, 5)]);
        assert!(view.has_more());
        let done = CollectionView::Paginated(page_of(vec![], 1, 2, 0));
        assert!(!done.has_more());
    }
}
