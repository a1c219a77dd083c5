//! Gallery client: cached reads, upload predictions and optimistic deletes.
//!
//! The query cache stores what the server returned. Rendering a first page
//! merges predictions in on the way out, so dropping a prediction never
//! requires rewriting cached views.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pixhaven_core::{ImageFilters, ImageId, ImageListPage, ImageRecord, PageRequest, Tag};
use pixhaven_server::{DeleteOutcome, UpdateImageRequest};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::optimistic::OptimisticMutationCoordinator;
use crate::prediction::{merge_first_page, ClientPredictionCache};
use crate::query_cache::{CachedValue, CollectionView, ListMode, ListQuery, QueryCache, QueryKey};
use crate::remote::ImageApi;

#[derive(Debug)]
struct ClientState {
    cache: QueryCache,
    predictions: ClientPredictionCache,
}

pub struct ImagesClient {
    api: Arc<dyn ImageApi>,
    config: ClientConfig,
    state: Mutex<ClientState>,
}

fn shape(query: &ListQuery, page: ImageListPage) -> CollectionView {
    match query.mode {
        ListMode::Paginated { .. } => CollectionView::Paginated(page),
        ListMode::Infinite => CollectionView::Infinite(vec![page]),
    }
}

/// Merge matching predictions into the first page of `view`.
fn render(
    query: &ListQuery,
    mut view: CollectionView,
    predictions: &ClientPredictionCache,
) -> CollectionView {
    if !query.is_first_page() {
        return view;
    }
    let later: Vec<ImageId> = view
        .pages()
        .iter()
        .skip(1)
        .flat_map(|page| page.ids())
        .collect();
    let predicted: Vec<ImageRecord> = predictions
        .project(&query.filters)
        .into_iter()
        .filter(|record| !later.contains(&record.id))
        .collect();
    if predicted.is_empty() {
        return view;
    }
    if let Some(first) = view.first_page_mut() {
        *first = merge_first_page(&predicted, first);
    }
    view
}

impl ImagesClient {
    pub fn new(api: Arc<dyn ImageApi>, config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let state = ClientState {
            cache: QueryCache::new(config.stale_after()),
            predictions: ClientPredictionCache::new(config.prediction_capacity),
        };
        Ok(Self {
            api,
            config,
            state: Mutex::new(state),
        })
    }

    // A panic mid-edit leaves at worst a stale view, which the next load repairs.
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn list_query(&self, filters: &ImageFilters, page: u32) -> ListQuery {
        ListQuery::paginated(filters, page, self.config.page_limit)
    }

    pub fn infinite_query(&self, filters: &ImageFilters) -> ListQuery {
        ListQuery::infinite(filters, self.config.page_limit)
    }

    pub fn revision(&self, key: &QueryKey) -> u64 {
        self.state().cache.revision(key)
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.state().cache.is_fresh(key)
    }

    pub fn cached_image(&self, id: ImageId) -> Option<ImageRecord> {
        self.state().cache.image(id).cloned()
    }

    pub fn predicted_count(&self) -> usize {
        self.state().predictions.len()
    }

    /// Remember images this client just created.
    pub fn record_uploads<I>(&self, records: I)
    where
        I: IntoIterator<Item = ImageRecord>,
    {
        let mut state = self.state();
        state.predictions.record(records);
        state.cache.mark_stale_where(|key| *key == QueryKey::Tags);
    }

    /// What to draw for `query` right now, without waiting on the network.
    ///
    /// A cached view is rendered with predictions merged in. An uncached
    /// first page filtered by format is seeded from its cached all-formats
    /// sibling; otherwise from predictions alone.
    pub fn placeholder(&self, query: &ListQuery) -> Option<CollectionView> {
        let state = self.state();
        if let Some(view) = state.cache.collection(query) {
            return Some(render(query, view.clone(), &state.predictions));
        }
        if !query.is_first_page() {
            return None;
        }

        let request = query.page_request();
        let seed = query
            .format_sibling()
            .and_then(|sibling| state.cache.collection(&sibling).and_then(|v| v.first_page()))
            .map(|page| {
                let images: Vec<ImageRecord> = page
                    .images
                    .iter()
                    .filter(|image| query.filters.matches(image))
                    .cloned()
                    .collect();
                let total = images.len() as u64;
                ImageListPage::new(images, request, total)
            });

        match seed {
            Some(page) => Some(render(query, shape(query, page), &state.predictions)),
            None => {
                let predicted = state.predictions.project(&query.filters);
                if predicted.is_empty() {
                    return None;
                }
                let page = merge_first_page(&predicted, &ImageListPage::empty(request));
                Some(shape(query, page))
            }
        }
    }

    /// Fetch `query` from the server, store it, and return it rendered.
    ///
    /// Fails with [`ClientError::Superseded`] when a newer fetch or an
    /// optimistic delete cancelled this one while it was in flight.
    pub async fn load(&self, query: &ListQuery) -> ClientResult<CollectionView> {
        let key = QueryKey::Images(query.clone());
        let ticket = self.state().cache.begin_fetch(key.clone());

        let fetched = self
            .api
            .list_images(&query.filters, query.page_request())
            .await;

        let mut state = self.state();
        let page = match fetched {
            Ok(page) => page,
            Err(err) => {
                state.cache.abandon_fetch(&ticket);
                return Err(err);
            }
        };
        let ids = page.ids();
        let view = shape(query, page);
        if !state
            .cache
            .complete_fetch(&ticket, CachedValue::Collection(view.clone()))
        {
            return Err(ClientError::Superseded(key));
        }
        let reconciled = state.predictions.reconcile(&ids);
        if reconciled > 0 {
            debug!(reconciled, "Predictions confirmed by server");
        }
        Ok(render(query, view, &state.predictions))
    }

    /// Serve a fresh cached view, or load it.
    pub async fn view(&self, query: &ListQuery) -> ClientResult<CollectionView> {
        {
            let state = self.state();
            let key = QueryKey::Images(query.clone());
            if state.cache.is_fresh(&key) {
                if let Some(view) = state.cache.collection(query) {
                    return Ok(render(query, view.clone(), &state.predictions));
                }
            }
        }
        self.load(query).await
    }

    /// Append the next page of an infinite view.
    pub async fn load_next_page(&self, query: &ListQuery) -> ClientResult<CollectionView> {
        if query.mode != ListMode::Infinite {
            return Err(ClientError::InvalidRequest(
                "load_next_page needs an infinite view".to_string(),
            ));
        }
        let key = QueryKey::Images(query.clone());

        let prepared = {
            let mut state = self.state();
            match state.cache.collection(query) {
                None => None,
                Some(view) if !view.has_more() => {
                    return Ok(render(query, view.clone(), &state.predictions));
                }
                Some(view) => {
                    let last = view.pages().last().map(|page| page.page).unwrap_or(0);
                    let next = PageRequest::new(last + 1, query.limit);
                    Some((state.cache.begin_fetch(key.clone()), next))
                }
            }
        };
        let Some((ticket, next)) = prepared else {
            return self.load(query).await;
        };

        let fetched = self.api.list_images(&query.filters, next).await;

        let mut state = self.state();
        let mut page = match fetched {
            Ok(page) => page,
            Err(err) => {
                state.cache.abandon_fetch(&ticket);
                return Err(err);
            }
        };
        let Some(CollectionView::Infinite(mut pages)) = state.cache.collection(query).cloned()
        else {
            state.cache.abandon_fetch(&ticket);
            return Err(ClientError::Superseded(key));
        };

        let listed = page.ids();
        // Uploads since the first page shift older images forward.
        let seen: Vec<ImageId> = pages.iter().flat_map(|p| p.ids()).collect();
        page.images.retain(|image| !seen.contains(&image.id));
        let total = page.total;
        pages.push(page);
        for page in pages.iter_mut() {
            page.set_total(total);
        }

        let view = CollectionView::Infinite(pages);
        if !state
            .cache
            .complete_fetch(&ticket, CachedValue::Collection(view.clone()))
        {
            return Err(ClientError::Superseded(key));
        }
        let reconciled = state.predictions.reconcile(&listed);
        if reconciled > 0 {
            debug!(reconciled, page = next.page, "Predictions confirmed by server");
        }
        Ok(render(query, view, &state.predictions))
    }

    pub async fn get_image(&self, id: ImageId) -> ClientResult<ImageRecord> {
        let key = QueryKey::Image(id);
        let ticket = {
            let mut state = self.state();
            if state.cache.is_fresh(&key) {
                if let Some(record) = state.cache.image(id) {
                    return Ok(record.clone());
                }
            }
            state.cache.begin_fetch(key.clone())
        };

        let fetched = self.api.get_image(id).await;
        let mut state = self.state();
        match fetched {
            Ok(record) => {
                if !state
                    .cache
                    .complete_fetch(&ticket, CachedValue::Image(record.clone()))
                {
                    return Err(ClientError::Superseded(key));
                }
                Ok(record)
            }
            Err(err) => {
                state.cache.abandon_fetch(&ticket);
                Err(err)
            }
        }
    }

    pub async fn tags(&self) -> ClientResult<Vec<Tag>> {
        let key = QueryKey::Tags;
        let ticket = {
            let mut state = self.state();
            if state.cache.is_fresh(&key) {
                if let Some(CachedValue::Tags(tags)) = state.cache.get(&key) {
                    return Ok(tags.clone());
                }
            }
            state.cache.begin_fetch(key.clone())
        };

        let fetched = self.api.list_tags().await;
        let mut state = self.state();
        match fetched {
            Ok(tags) => {
                if !state
                    .cache
                    .complete_fetch(&ticket, CachedValue::Tags(tags.clone()))
                {
                    return Err(ClientError::Superseded(key));
                }
                Ok(tags)
            }
            Err(err) => {
                state.cache.abandon_fetch(&ticket);
                Err(err)
            }
        }
    }

    /// Update on the server, then refresh the detail entry and mark every
    /// list and the tag list stale.
    pub async fn update_image(
        &self,
        id: ImageId,
        request: &UpdateImageRequest,
    ) -> ClientResult<ImageRecord> {
        let updated = self.api.update_image(id, request).await?;

        let mut state = self.state();
        state.cache.cancel_where(|key| *key == QueryKey::Image(id));
        state
            .cache
            .set(QueryKey::Image(id), CachedValue::Image(updated.clone()));
        let marked = state
            .cache
            .mark_stale_where(|key| key.is_image_list() || *key == QueryKey::Tags);
        if state.predictions.contains(id) {
            state.predictions.record([updated.clone()]);
        }
        debug!(image_id = %id, marked, "Image updated");
        Ok(updated)
    }

    /// Delete optimistically: cached views change before the server answers
    /// and are restored if it refuses.
    ///
    /// A not-found answer keeps the removal, since the image is gone either way.
    pub async fn delete_image(&self, id: ImageId) -> ClientResult<DeleteOutcome> {
        let undo = {
            let mut guard = self.state();
            let ClientState { cache, predictions } = &mut *guard;
            OptimisticMutationCoordinator::new(cache, predictions).apply_delete(id)
        };

        match self.api.delete_image(id).await {
            Ok(outcome) => {
                let mut state = self.state();
                state.cache.mark_stale_where(|key| *key == QueryKey::Tags);
                info!(image_id = %id, state = %outcome.state, "Image deleted");
                Ok(outcome)
            }
            Err(err) if err.is_not_found() => {
                let mut state = self.state();
                state.cache.mark_stale_where(|key| *key == QueryKey::Tags);
                debug!(image_id = %id, "Image already gone on server");
                Err(err)
            }
            Err(err) => {
                let mut guard = self.state();
                let ClientState { cache, predictions } = &mut *guard;
                OptimisticMutationCoordinator::new(cache, predictions).rollback(undo);
                warn!(image_id = %id, error = %err, "Delete rejected, rolled back");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ImagesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagesClient")
            .field("config", &self.config)
            .finish()
    }
}
