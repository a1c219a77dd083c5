//! Image Service
//!
//! Reads, updates, deletes and the expiry sweep for single images.

use chrono::{Duration as ChronoDuration, Utc};
use pixhaven_core::{
    ExpiryChange, ImageFilters, ImageId, ImageListPage, ImagePatch, ImageRecord, PageRequest,
    ResourceClass, Timestamp, ValidationError,
};
use pixhaven_storage::{CollectionQuery, Mutation};

use crate::constants::MAX_EXPIRY_MINUTES;
use crate::error::{ApiError, ApiResult};
use crate::reclamation::ReclaimState;
use crate::state::AppState;
use crate::types::{DeleteOutcome, SweepReport, UpdateImageRequest};

/// Expiry timestamp `minutes` after `now`. Zero means no expiry.
pub(crate) fn expiry_from_minutes(
    now: Timestamp,
    minutes: u64,
) -> Result<Option<Timestamp>, ValidationError> {
    if minutes > MAX_EXPIRY_MINUTES {
        return Err(ValidationError::InvalidValue {
            field: "expiry_minutes".to_string(),
            reason: format!("must be at most {}", MAX_EXPIRY_MINUTES),
        });
    }
    if minutes == 0 {
        return Ok(None);
    }
    // Bounded above, so the cast cannot wrap.
    Ok(Some(now + ChronoDuration::minutes(minutes as i64)))
}

pub(crate) fn advance(state: ReclaimState, target: ReclaimState) -> ApiResult<ReclaimState> {
    state
        .advance(target)
        .map_err(|e| ApiError::internal_error(e.to_string()))
}

/// One page of images matching `filters`.
///
/// `page` and `limit` default to 1 and the configured page size.
pub async fn list_images(
    state: &AppState,
    filters: &ImageFilters,
    page: Option<u32>,
    limit: Option<u32>,
) -> ApiResult<ImageListPage> {
    let filters = filters.normalized();
    let request = PageRequest::new(
        page.unwrap_or(1),
        limit.unwrap_or(state.config.default_page_limit),
    );
    let key = state
        .keys()
        .make_collection_key(&CollectionQuery::images(&filters, request));
    let ttl = state.cache.config().collection_ttl(ResourceClass::Image);

    let store = &state.store;
    let filters_ref = &filters;
    let listed = state
        .cache
        .get_or_fill(&key, ttl, move || async move {
            store
                .query_images(filters_ref, request)
                .await
                .map(|(images, total)| Some(ImageListPage::new(images, request, total)))
        })
        .await?;

    Ok(listed.unwrap_or_else(|| ImageListPage::empty(request)))
}

/// One image's detail.
pub async fn get_image(state: &AppState, id: ImageId) -> ApiResult<ImageRecord> {
    let key = state.keys().make_entity_key(ResourceClass::Image, id);
    let ttl = state.cache.config().entity_ttl(ResourceClass::Image);

    state
        .cache
        .get_or_fill(&key, ttl, move || state.store.get_image(id))
        .await?
        .ok_or_else(|| ApiError::image_not_found(id))
}

/// Change an image's tags or expiry.
///
/// A tag change purges every image and tag list; an expiry change only the
/// image's detail entry.
pub async fn update_image(
    state: &AppState,
    id: ImageId,
    request: UpdateImageRequest,
) -> ApiResult<ImageRecord> {
    let mut patch = ImagePatch::default();
    if let Some(tags) = &request.tags {
        patch = patch.with_tags(tags);
    }
    if let Some(minutes) = request.expiry_minutes {
        let change = match expiry_from_minutes(Utc::now(), minutes)? {
            Some(at) => ExpiryChange::At(at),
            None => ExpiryChange::Clear,
        };
        patch = patch.with_expiry(change);
    }
    if patch.is_empty() {
        return Err(ApiError::invalid_input("Update must change tags or expiry"));
    }

    let updated = state
        .store
        .update_image(id, &patch)
        .await?
        .ok_or_else(|| ApiError::image_not_found(id))?;

    let mutation = if patch.changes_filter_fields() {
        Mutation::ImageRetagged { id }
    } else {
        Mutation::ImageUpdated { id }
    };
    state.router.purge(&mutation).await?;

    tracing::info!(image_id = %id, mutation = mutation.kind(), "Image updated");
    Ok(updated)
}

/// Delete an image and reclaim its blobs.
///
/// The purge runs even when the image is already gone, so retrying a delete
/// whose purge failed converges. Blob failures never undo the delete; they
/// surface as a warning on the outcome.
pub async fn delete_image(state: &AppState, id: ImageId) -> ApiResult<DeleteOutcome> {
    let mut progress = ReclaimState::MetadataPending;

    let deleted = state.store.delete_image(id).await?;
    progress = advance(progress, ReclaimState::MetadataCommitted)?;

    if let Err(err) = state.router.purge(&Mutation::ImageDeleted { id }).await {
        // A retry will not find the row again, so its blobs go now or never.
        if let Some(record) = &deleted {
            let reclaimed = state.dispatcher.reclaim_image(&record.to_ref()).await;
            tracing::warn!(
                image_id = %id,
                blobs = %reclaimed.state,
                "Purge failed after metadata commit"
            );
        }
        return Err(err.into());
    }
    progress = advance(progress, ReclaimState::CacheInvalidated)?;

    let Some(record) = deleted else {
        return Err(ApiError::image_not_found(id));
    };

    let reclaimed = state.dispatcher.reclaim_image(&record.to_ref()).await;
    if reclaimed.state == ReclaimState::BlobsReclaimed {
        progress = advance(progress, ReclaimState::BlobsReclaimed)?;
    }

    if let Some(warning) = &reclaimed.warning {
        tracing::warn!(image_id = %id, warning = %warning, "Image deleted with orphaned blobs");
    } else {
        tracing::info!(image_id = %id, state = %progress, "Image deleted");
    }

    Ok(DeleteOutcome {
        id,
        state: progress,
        reclamation: reclaimed.summary,
        warning: reclaimed.warning,
    })
}

/// Delete up to `batch_size` images whose expiry is at or before `now`.
pub async fn sweep_expired(
    state: &AppState,
    now: Timestamp,
    batch_size: usize,
) -> ApiResult<SweepReport> {
    let expired = state.store.list_expired(now, batch_size).await?;
    let mut report = SweepReport::default();

    for image in expired {
        match delete_image(state, image.id).await {
            Ok(outcome) => {
                report.deleted += 1;
                if outcome.warning.is_some() {
                    report.warnings += 1;
                }
            }
            // Deleted by someone else since the listing.
            Err(err) if err.code == crate::error::ErrorCode::ImageNotFound => {}
            Err(err) => {
                tracing::error!(image_id = %image.id, error = %err, "Expired image delete failed");
                report.failed += 1;
            }
        }
    }

    if report.deleted > 0 || report.failed > 0 {
        tracing::info!(
            deleted = report.deleted,
            failed = report.failed,
            warnings = report.warnings,
            "Expiry sweep completed"
        );
    }
    Ok(report)
}
