//! Paginated collection payloads.

use crate::{ImageId, ImageRecord, PageRequest};
use serde::{Deserialize, Serialize};

/// `ceil(total / limit)`, zero when the collection is empty.
pub fn total_pages(total: u64, limit: u32) -> u64 {
    let limit = u64::from(limit.max(1));
    total.div_ceil(limit)
}

/// One page of an image collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageListPage {
    pub images: Vec<ImageRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl ImageListPage {
    pub fn new(images: Vec<ImageRecord>, request: PageRequest, total: u64) -> Self {
        Self {
            images,
            page: request.page,
            limit: request.limit,
            total,
            total_pages: total_pages(total, request.limit),
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.iter().any(|image| image.id == id)
    }

    pub fn ids(&self) -> Vec<ImageId> {
        self.images.iter().map(|image| image.id).collect()
    }

    /// Set `total` and recompute `total_pages`, never reporting fewer than one page.
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
        self.total_pages = total_pages(total, self.limit).max(1);
    }

    /// Remove an image by id. Returns the removed record and its position.
    pub fn remove(&mut self, id: ImageId) -> Option<(usize, ImageRecord)> {
        let index = self.images.iter().position(|image| image.id == id)?;
        Some((index, self.images.remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(30, 10), 3);
        assert_eq!(total_pages(31, 10), 4);
        assert_eq!(total_pages(5, 0), 5);
    }

    #[test]
    fn test_set_total_reports_at_least_one_page() {
        let mut page = ImageListPage::empty(PageRequest::first(12));
        assert_eq!(page.total_pages, 0);
        page.set_total(0);
        assert_eq!(page.total_pages, 1);
        page.set_total(26);
        assert_eq!(page.total_pages, 3);
    }
}
