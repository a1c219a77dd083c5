//! Blob reclamation after metadata deletes.
//!
//! # State Transition Diagram
//!
//! ```text
//! MetadataPending ─ commit ─→ MetadataCommitted ─ purge ─→ CacheInvalidated ─ reclaim ─→ BlobsReclaimed
//! ```
//!
//! The purge step runs in the request path and must succeed. The reclaim step
//! runs inline or through the queue, and a delete may respond while still in
//! `CacheInvalidated`: an orphaned blob is a correctable leak, a dangling
//! metadata or cache reference is not.

mod dispatcher;
mod queue;

pub use dispatcher::{ReclaimOutcome, ReclamationDispatcher};
pub use queue::{DeadLetter, Delivery, InMemoryQueue, QueueTransport, Receipt, RetryOutcome};

use std::fmt;

use chrono::Utc;
use pixhaven_core::{ImageId, ImageRef, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// DELETE STATE
// ============================================================================

/// Progress of one delete through the reclamation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReclaimState {
    MetadataPending,
    MetadataCommitted,
    CacheInvalidated,
    BlobsReclaimed,
}

impl ReclaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimState::MetadataPending => "METADATA_PENDING",
            ReclaimState::MetadataCommitted => "METADATA_COMMITTED",
            ReclaimState::CacheInvalidated => "CACHE_INVALIDATED",
            ReclaimState::BlobsReclaimed => "BLOBS_RECLAIMED",
        }
    }

    /// The only state reachable from this one.
    pub fn next(&self) -> Option<ReclaimState> {
        match self {
            ReclaimState::MetadataPending => Some(ReclaimState::MetadataCommitted),
            ReclaimState::MetadataCommitted => Some(ReclaimState::CacheInvalidated),
            ReclaimState::CacheInvalidated => Some(ReclaimState::BlobsReclaimed),
            ReclaimState::BlobsReclaimed => None,
        }
    }

    /// Step to `target`, which must be the immediate successor.
    pub fn advance(self, target: ReclaimState) -> Result<ReclaimState, InvalidTransition> {
        if self.next() == Some(target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReclaimState::BlobsReclaimed)
    }
}

impl fmt::Display for ReclaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted skip or reversal in the delete state machine.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid reclamation transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ReclaimState,
    pub to: ReclaimState,
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DeleteSingle,
    DeleteBatch,
}

/// Blob keys to delete after their metadata is gone.
///
/// Consumed at least once. Handling must be idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclamationTask {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub image_ids: Vec<ImageId>,
    /// Ordered and deduplicated.
    pub blob_keys: Vec<String>,
    /// Tag whose cascade produced this task, for batch tasks.
    pub origin: Option<String>,
    pub created_at: Timestamp,
}

impl ReclamationTask {
    fn build(kind: TaskKind, images: &[ImageRef], origin: Option<&str>) -> Self {
        let mut blob_keys: Vec<String> = Vec::new();
        for key in images.iter().flat_map(|image| image.paths.blob_keys()) {
            if !blob_keys.contains(&key) {
                blob_keys.push(key);
            }
        }
        Self {
            task_id: Uuid::now_v7(),
            kind,
            image_ids: images.iter().map(|image| image.id).collect(),
            blob_keys,
            origin: origin.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    pub fn single(image: &ImageRef) -> Self {
        Self::build(TaskKind::DeleteSingle, std::slice::from_ref(image), None)
    }

    /// Split a cascade into tasks of at most `chunk_size` images each.
    ///
    /// A zero chunk size is treated as one image per task.
    pub fn chunked(origin: &str, images: &[ImageRef], chunk_size: usize) -> Vec<Self> {
        images
            .chunks(chunk_size.max(1))
            .map(|chunk| Self::build(TaskKind::DeleteBatch, chunk, Some(origin)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.blob_keys.is_empty()
    }
}
