//! Upload Service
//!
//! Every representation's blob must land before the metadata row commits, so
//! metadata never points at a missing object.

use chrono::Utc;
use futures_util::future::try_join_all;
use pixhaven_core::{
    new_image_id, normalize_tag_list, ImageFormat, ImagePaths, ImageRecord, ImageSizes,
    Orientation, ValidationError,
};
use pixhaven_storage::Mutation;

use crate::constants::MAX_UPLOAD_BYTES;
use crate::error::ApiResult;
use crate::services::image_service::expiry_from_minutes;
use crate::state::AppState;
use crate::types::{UploadRequest, UploadResponse};

const WEBP_CONTENT_TYPE: &str = "image/webp";
const AVIF_CONTENT_TYPE: &str = "image/avif";

fn validate(request: &UploadRequest) -> Result<(), ValidationError> {
    if request.original_name.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "original_name".to_string(),
        });
    }
    if request.bytes.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "file".to_string(),
        });
    }
    let size = request.bytes.len() as u64;
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::PayloadTooLarge {
            size,
            max: MAX_UPLOAD_BYTES,
        });
    }
    if request.width == 0 || request.height == 0 {
        return Err(ValidationError::InvalidValue {
            field: "dimensions".to_string(),
            reason: "width and height must be positive".to_string(),
        });
    }
    Ok(())
}

/// Paths for the representations actually present in the request.
fn paths_for(request: &UploadRequest, generated: ImagePaths) -> ImagePaths {
    if !request.format.has_derived_variants() {
        return generated;
    }
    ImagePaths {
        original: generated.original,
        webp: generated.webp.filter(|_| request.derived.webp.is_some()),
        avif: generated.avif.filter(|_| request.derived.avif.is_some()),
    }
}

/// Store a new image and its derived copies.
pub async fn upload_image(state: &AppState, request: UploadRequest) -> ApiResult<UploadResponse> {
    validate(&request)?;
    let now = Utc::now();
    let expiry_time = expiry_from_minutes(now, request.expiry_minutes.unwrap_or(0))?;

    let id = new_image_id();
    let orientation = Orientation::from_dimensions(request.width, request.height);
    let paths = paths_for(
        &request,
        ImagePaths::generate(id, orientation, request.format),
    );

    let mut sizes = ImageSizes {
        original: request.bytes.len() as u64,
        ..ImageSizes::default()
    };
    let mut writes: Vec<(String, Vec<u8>, &str)> = vec![(
        paths.original.clone(),
        request.bytes,
        request.format.content_type(),
    )];
    if request.format != ImageFormat::Gif {
        if let (Some(key), Some(bytes)) = (&paths.webp, request.derived.webp) {
            sizes.webp = bytes.len() as u64;
            writes.push((key.clone(), bytes, WEBP_CONTENT_TYPE));
        }
        if let (Some(key), Some(bytes)) = (&paths.avif, request.derived.avif) {
            sizes.avif = bytes.len() as u64;
            writes.push((key.clone(), bytes, AVIF_CONTENT_TYPE));
        }
    }

    let blobs = &state.blobs;
    let written = try_join_all(
        writes
            .into_iter()
            .map(|(key, bytes, content_type)| async move {
                blobs.put(&key, bytes, content_type).await
            }),
    )
    .await;
    if let Err(err) = written {
        discard_blobs(state, &paths).await;
        return Err(err.into());
    }

    let record = ImageRecord {
        id,
        original_name: request.original_name.trim().to_string(),
        upload_time: now,
        expiry_time,
        orientation,
        tags: normalize_tag_list(&request.tags),
        format: request.format,
        width: request.width,
        height: request.height,
        paths,
        sizes,
    };

    if let Err(err) = state.store.create_image(&record).await {
        discard_blobs(state, &record.paths).await;
        return Err(err.into());
    }

    state
        .router
        .purge(&Mutation::ImageCreated {
            tagged: !record.tags.is_empty(),
        })
        .await?;

    tracing::info!(
        image_id = %record.id,
        format = %record.format,
        orientation = %record.orientation,
        tags = record.tags.len(),
        "Image uploaded"
    );
    Ok(UploadResponse { image: record })
}

/// Best-effort removal of blobs written for a failed upload.
async fn discard_blobs(state: &AppState, paths: &ImagePaths) {
    if let Err(err) = state.blobs.delete_many(&paths.blob_keys()).await {
        tracing::warn!(
            original = %paths.original,
            error = %err,
            "Failed to discard blobs of a failed upload"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DerivedImages;

    #[test]
    fn test_validate_rejects_empty_file() {
        let request = UploadRequest::new("a.png", vec![], ImageFormat::Png).with_dimensions(1, 1);
        assert!(matches!(
            validate(&request),
            Err(ValidationError::RequiredFieldMissing { field }) if field == "file"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_dimensions() {
        let request = UploadRequest::new("a.png", vec![1], ImageFormat::Png);
        assert!(validate(&request).is_err());
    }

    #[test]
    fn test_missing_derived_copies_leave_no_path() {
        let id = new_image_id();
        let request = UploadRequest::new("a.jpg", vec![1], ImageFormat::Jpeg)
            .with_dimensions(2, 1)
            .with_derived(DerivedImages {
                webp: Some(vec![2]),
                avif: None,
            });
        let paths = paths_for(
            &request,
            ImagePaths::generate(id, Orientation::Landscape, ImageFormat::Jpeg),
        );
        assert!(paths.webp.is_some());
        assert!(paths.avif.is_none());
    }
}
