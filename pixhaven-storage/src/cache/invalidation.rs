//! Mutation-driven cache invalidation.
//!
//! Every metadata-mutating operation describes itself as a [`Mutation`] and
//! calls [`InvalidationRouter::purge`] after the metadata write commits and
//! before it responds. A purge error must fail the mutation: a caller that
//! re-reads immediately has to see a miss, never a stale hit.
//!
//! Purges are idempotent and commute, so concurrent mutations need no
//! coordination beyond the transport itself.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use pixhaven_core::{CacheError, ImageId, ResourceClass};
use tracing::{error, info};

use super::key_space::{CacheKey, KeyPattern, KeySpace};
use super::read_through::ReadThroughCache;

/// A committed metadata change, described by what it can make stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `tagged` is set when the new image carries tags, which shifts tag counts.
    ImageCreated { tagged: bool },
    /// An update that leaves every collection-filter field untouched.
    ImageUpdated { id: ImageId },
    /// An update that changed the image's tag set.
    ImageRetagged { id: ImageId },
    ImageDeleted { id: ImageId },
    TagCreated,
    /// `affected` lists images whose embedded tag value changed.
    TagRenamed { affected: Vec<ImageId> },
    /// `cascaded` lists images deleted along with the tag.
    TagDeleted { cascaded: Vec<ImageId> },
    TagsBatchUpdated { ids: Vec<ImageId> },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::ImageCreated { .. } => "image_created",
            Mutation::ImageUpdated { .. } => "image_updated",
            Mutation::ImageRetagged { .. } => "image_retagged",
            Mutation::ImageDeleted { .. } => "image_deleted",
            Mutation::TagCreated => "tag_created",
            Mutation::TagRenamed { .. } => "tag_renamed",
            Mutation::TagDeleted { .. } => "tag_deleted",
            Mutation::TagsBatchUpdated { .. } => "tags_batch_updated",
        }
    }
}

/// Exact keys and key prefixes one mutation must purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub keys: BTreeSet<CacheKey>,
    pub prefixes: BTreeSet<KeyPattern>,
}

impl InvalidationPlan {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.prefixes.is_empty()
    }

    /// Whether `key` is removed by this plan.
    pub fn covers(&self, key: &CacheKey) -> bool {
        self.keys.contains(key) || self.prefixes.iter().any(|p| key.matches(p))
    }
}

/// What a purge actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys_deleted: usize,
    pub prefix_entries_removed: u64,
}

/// Maps mutations to invalidation plans and executes them.
#[derive(Debug, Clone)]
pub struct InvalidationRouter {
    cache: Arc<ReadThroughCache>,
}

impl InvalidationRouter {
    pub fn new(cache: Arc<ReadThroughCache>) -> Self {
        Self { cache }
    }

    pub fn key_space(&self) -> &KeySpace {
        self.cache.keys()
    }

    /// Compute the purge set for `mutation`. Pure.
    pub fn plan(&self, mutation: &Mutation) -> InvalidationPlan {
        let keys = self.cache.keys();
        let mut plan = InvalidationPlan::default();
        let image_lists = keys.collection_prefix(ResourceClass::Image);
        let tag_lists = keys.collection_prefix(ResourceClass::Tag);
        let image_key = |id: &ImageId| keys.make_entity_key(ResourceClass::Image, id);

        match mutation {
            Mutation::ImageCreated { tagged } => {
                plan.prefixes.insert(image_lists);
                if *tagged {
                    plan.prefixes.insert(tag_lists);
                }
            }
            Mutation::ImageUpdated { id } => {
                plan.keys.insert(image_key(id));
            }
            Mutation::ImageRetagged { id } | Mutation::ImageDeleted { id } => {
                plan.keys.insert(image_key(id));
                plan.prefixes.insert(image_lists);
                plan.prefixes.insert(tag_lists);
            }
            Mutation::TagCreated => {
                plan.prefixes.insert(tag_lists);
            }
            Mutation::TagRenamed { affected: ids }
            | Mutation::TagDeleted { cascaded: ids }
            | Mutation::TagsBatchUpdated { ids } => {
                plan.prefixes.insert(tag_lists);
                plan.prefixes.insert(image_lists);
                plan.keys.extend(ids.iter().map(image_key));
            }
        }

        plan
    }

    /// Purge everything `mutation` can make stale.
    ///
    /// Returns only once every delete has been acknowledged by the transport.
    pub async fn purge(&self, mutation: &Mutation) -> Result<InvalidationReport, CacheError> {
        let plan = self.plan(mutation);
        self.execute(mutation.kind(), &plan).await
    }

    async fn execute(
        &self,
        kind: &'static str,
        plan: &InvalidationPlan,
    ) -> Result<InvalidationReport, CacheError> {
        let prefix_counts = try_join_all(
            plan.prefixes
                .iter()
                .map(|prefix| self.cache.delete_by_prefix(prefix)),
        )
        .await
        .map_err(|err| {
            error!(mutation = kind, error = %err, "Collection purge failed");
            err
        })?;

        try_join_all(plan.keys.iter().map(|key| self.cache.delete(key)))
            .await
            .map_err(|err| {
                error!(mutation = kind, error = %err, "Entity purge failed");
                err
            })?;

        let report = InvalidationReport {
            keys_deleted: plan.keys.len(),
            prefix_entries_removed: prefix_counts.iter().sum(),
        };
        info!(
            mutation = kind,
            keys = report.keys_deleted,
            prefixes = plan.prefixes.len(),
            prefix_entries_removed = report.prefix_entries_removed,
            "Cache invalidated"
        );
        Ok(report)
    }
}
