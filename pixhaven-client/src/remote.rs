//! Transport seam between the client caches and the server.

use async_trait::async_trait;
use pixhaven_core::{ImageFilters, ImageId, ImageListPage, ImageRecord, PageRequest, Tag};
use pixhaven_server::{services, AppState, DeleteOutcome, UpdateImageRequest};

use crate::error::ClientResult;

/// The server calls the client caches depend on.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn list_images(
        &self,
        filters: &ImageFilters,
        page: PageRequest,
    ) -> ClientResult<ImageListPage>;

    async fn get_image(&self, id: ImageId) -> ClientResult<ImageRecord>;

    async fn update_image(
        &self,
        id: ImageId,
        request: &UpdateImageRequest,
    ) -> ClientResult<ImageRecord>;

    async fn delete_image(&self, id: ImageId) -> ClientResult<DeleteOutcome>;

    async fn list_tags(&self) -> ClientResult<Vec<Tag>>;
}

/// Calls the service layer directly, for embedding and end-to-end tests.
#[derive(Debug, Clone)]
pub struct InProcessApi {
    state: AppState,
}

impl InProcessApi {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

#[async_trait]
impl ImageApi for InProcessApi {
    async fn list_images(
        &self,
        filters: &ImageFilters,
        page: PageRequest,
    ) -> ClientResult<ImageListPage> {
        Ok(services::list_images(&self.state, filters, Some(page.page), Some(page.limit)).await?)
    }

    async fn get_image(&self, id: ImageId) -> ClientResult<ImageRecord> {
        Ok(services::get_image(&self.state, id).await?)
    }

    async fn update_image(
        &self,
        id: ImageId,
        request: &UpdateImageRequest,
    ) -> ClientResult<ImageRecord> {
        Ok(services::update_image(&self.state, id, request.clone()).await?)
    }

    async fn delete_image(&self, id: ImageId) -> ClientResult<DeleteOutcome> {
        Ok(services::delete_image(&self.state, id).await?)
    }

    async fn list_tags(&self) -> ClientResult<Vec<Tag>> {
        Ok(services::list_tags(&self.state).await?)
    }
}
