//! Tag Service
//!
//! Tag listing, creation, rename, cascade delete and batch retagging.

use std::collections::HashSet;

use pixhaven_core::{normalize_tag_list, require_tag_name, ImageId, ResourceClass, Tag};
use pixhaven_storage::{CollectionQuery, Mutation};

use crate::constants::MAX_BATCH_ITEMS;
use crate::error::{ApiError, ApiResult};
use crate::reclamation::ReclaimState;
use crate::services::image_service::advance;
use crate::state::AppState;
use crate::types::{BatchTagOutcome, BatchTagRequest, DeleteTagOutcome, RenameTagOutcome};

/// Every tag with its image count, sorted by name.
pub async fn list_tags(state: &AppState) -> ApiResult<Vec<Tag>> {
    let key = state.keys().make_collection_key(&CollectionQuery::Tags);
    let ttl = state.cache.config().collection_ttl(ResourceClass::Tag);
    let store = &state.store;

    let tags = state
        .cache
        .get_or_fill(&key, ttl, move || async move {
            store.list_tags().await.map(Some)
        })
        .await?;
    Ok(tags.unwrap_or_default())
}

pub async fn create_tag(state: &AppState, raw_name: &str) -> ApiResult<Tag> {
    let name = require_tag_name("name", raw_name)?;
    let tag = state.store.create_tag(&name).await?;
    state.router.purge(&Mutation::TagCreated).await?;

    tracing::info!(tag = %name, "Tag created");
    Ok(tag)
}

/// Rename a tag on every image that carries it.
///
/// Renaming onto an existing tag is a conflict; renaming to the same name
/// after normalization is invalid input.
pub async fn rename_tag(
    state: &AppState,
    raw_old: &str,
    raw_new: &str,
) -> ApiResult<RenameTagOutcome> {
    let old_name = require_tag_name("old_name", raw_old)?;
    let new_name = require_tag_name("new_name", raw_new)?;
    if old_name == new_name {
        return Err(ApiError::invalid_input(
            "New tag name must differ from the old one",
        ));
    }

    let affected = state.store.rename_tag(&old_name, &new_name).await?;
    let affected_images = affected.len();
    state
        .router
        .purge(&Mutation::TagRenamed { affected })
        .await?;

    tracing::info!(
        old_name = %old_name,
        new_name = %new_name,
        affected_images,
        "Tag renamed"
    );
    Ok(RenameTagOutcome {
        old_name,
        new_name,
        affected_images,
    })
}

/// Delete a tag and every image carrying it.
///
/// The cascade commits atomically in the metadata store; blobs are then
/// reclaimed in chunks that succeed or fail independently.
pub async fn delete_tag(state: &AppState, raw_name: &str) -> ApiResult<DeleteTagOutcome> {
    let name = require_tag_name("name", raw_name)?;
    let mut progress = ReclaimState::MetadataPending;

    let cascaded = state.store.delete_tag_with_images(&name).await?;
    progress = advance(progress, ReclaimState::MetadataCommitted)?;

    let ids: Vec<ImageId> = cascaded.iter().map(|image| image.id).collect();
    if let Err(err) = state
        .router
        .purge(&Mutation::TagDeleted { cascaded: ids })
        .await
    {
        // The tag row is gone, so a retry cannot reach these blobs.
        let reclaimed = state.dispatcher.reclaim_cascade(&name, &cascaded).await;
        tracing::warn!(
            tag = %name,
            deleted_images = cascaded.len(),
            blobs = %reclaimed.state,
            "Purge failed after metadata commit"
        );
        return Err(err.into());
    }
    progress = advance(progress, ReclaimState::CacheInvalidated)?;

    let reclaimed = state.dispatcher.reclaim_cascade(&name, &cascaded).await;
    if reclaimed.state == ReclaimState::BlobsReclaimed {
        progress = advance(progress, ReclaimState::BlobsReclaimed)?;
    }

    tracing::info!(
        tag = %name,
        deleted_images = cascaded.len(),
        tasks = reclaimed.summary.tasks,
        state = %progress,
        "Tag deleted"
    );
    Ok(DeleteTagOutcome {
        tag: name,
        deleted_images: cascaded.len(),
        state: progress,
        reclamation: reclaimed.summary,
        warning: reclaimed.warning,
    })
}

/// Add then remove tags on many images. Missing images are skipped.
pub async fn batch_update_tags(
    state: &AppState,
    request: BatchTagRequest,
) -> ApiResult<BatchTagOutcome> {
    if request.image_ids.is_empty() {
        return Err(ApiError::missing_field("image_ids"));
    }
    if request.image_ids.len() > MAX_BATCH_ITEMS {
        return Err(ApiError::invalid_input(format!(
            "At most {} images per batch, got {}",
            MAX_BATCH_ITEMS,
            request.image_ids.len()
        )));
    }

    let add = normalize_tag_list(&request.add);
    let remove = normalize_tag_list(&request.remove);
    if add.is_empty() && remove.is_empty() {
        return Err(ApiError::invalid_input(
            "Batch must add or remove at least one tag",
        ));
    }

    let mut seen = HashSet::new();
    let ids: Vec<ImageId> = request
        .image_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();

    let updated = state.store.batch_update_tags(&ids, &add, &remove).await?;
    let updated_count = updated.len();
    if updated_count > 0 {
        state
            .router
            .purge(&Mutation::TagsBatchUpdated { ids: updated })
            .await?;
    }

    tracing::info!(
        requested = ids.len(),
        updated = updated_count,
        added = add.len(),
        removed = remove.len(),
        "Batch tag update"
    );
    Ok(BatchTagOutcome { updated_count })
}
