//! Blob reclamation through the inline path, the queue and the worker.

use chrono::{Duration as ChronoDuration, Utc};
use pixhaven_core::ImageFilters;
use pixhaven_server::{services, ErrorCode, QueueTransport, ReclaimState};
use pixhaven_storage::MetadataStore;

#[path = "support/harness.rs"]
mod harness;
use harness::{landscape_jpeg, Harness};

#[tokio::test]
async fn inline_delete_reclaims_every_representation() {
    let h = Harness::inline();
    let image = h.upload("a.jpg", &[]).await.unwrap();
    assert_eq!(h.blobs.inner().len(), 3);

    let outcome = services::delete_image(&h.state, image.id).await.unwrap();
    assert_eq!(outcome.state, ReclaimState::BlobsReclaimed);
    assert_eq!(outcome.reclamation.blobs_deleted, 3);
    assert!(h.blobs.inner().is_empty());
}

#[tokio::test]
async fn blob_failure_warns_but_keeps_the_delete() {
    let h = Harness::inline();
    let image = h.upload("a.jpg", &["cats"]).await.unwrap();
    services::list_images(&h.state, &ImageFilters::all(), None, None)
        .await
        .unwrap();

    h.blobs.fail_deletes(true);
    let outcome = services::delete_image(&h.state, image.id).await.unwrap();
    assert_eq!(outcome.state, ReclaimState::CacheInvalidated);
    assert!(outcome
        .warning
        .as_deref()
        .is_some_and(|w| w.starts_with("metadata deleted but 1 of 1")));

    // Metadata and cache agree even though the bytes linger.
    assert!(h.store.get_image(image.id).await.unwrap().is_none());
    let page = services::list_images(&h.state, &ImageFilters::all(), None, None)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(h.blobs.inner().len(), 3);
}

#[tokio::test]
async fn queued_cascade_is_chunked_and_drained_by_the_worker() {
    let h = Harness::queued(2);
    for i in 0..5 {
        h.upload(&format!("cat-{}.jpg", i), &["cats"]).await.unwrap();
    }

    let outcome = services::delete_tag(&h.state, "cats").await.unwrap();
    assert_eq!(outcome.deleted_images, 5);
    assert_eq!(outcome.state, ReclaimState::CacheInvalidated);
    assert_eq!(outcome.reclamation.tasks, 3);
    assert_eq!(outcome.reclamation.enqueued, 3);
    assert_eq!(outcome.reclamation.blobs_deleted, 0);

    // Metadata is already gone; the bytes wait for the worker.
    assert_eq!(h.store.image_count(), 0);
    assert_eq!(h.blobs.inner().len(), 15);

    let metrics = h.drain_queue().await.snapshot();
    assert_eq!(metrics.tasks_acked, 3);
    assert_eq!(metrics.blobs_deleted, 15);
    assert!(h.blobs.inner().is_empty());
    assert!(h.queue().is_drained().await);
}

#[tokio::test]
async fn poison_task_is_dead_lettered_not_dropped() {
    let h = Harness::queued(50);
    let image = h.upload("a.jpg", &[]).await.unwrap();
    services::delete_image(&h.state, image.id).await.unwrap();

    h.blobs.fail_deletes(true);
    let metrics = h.drain_queue().await.snapshot();
    assert_eq!(metrics.tasks_acked, 0);
    assert_eq!(metrics.tasks_dead_lettered, 1);

    let dead = h.queue().dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, h.queue().max_attempts());
    assert!(dead[0].body.contains(&image.id.to_string()));
    assert!(h.queue().is_drained().await);
}

#[tokio::test]
async fn closed_queue_falls_back_to_inline_reclamation() {
    let h = Harness::queued(50);
    let image = h.upload("a.jpg", &[]).await.unwrap();
    h.queue().close().await;

    let outcome = services::delete_image(&h.state, image.id).await.unwrap();
    assert_eq!(outcome.reclamation.enqueued, 0);
    assert_eq!(outcome.reclamation.blobs_deleted, 3);
    assert_eq!(outcome.state, ReclaimState::BlobsReclaimed);
    assert!(h.blobs.inner().is_empty());
}

#[tokio::test]
async fn redelivered_task_deletes_each_blob_once() {
    let h = Harness::queued(50);
    let image = h.upload("a.jpg", &[]).await.unwrap();
    services::delete_image(&h.state, image.id).await.unwrap();

    // First delivery fails and is retried, the second succeeds.
    let queue = h.queue();
    let first = queue.receive(1).await.unwrap();
    assert_eq!(first.len(), 1);
    queue
        .retry(first[0].receipt, std::time::Duration::ZERO)
        .await
        .unwrap();

    let metrics = h.drain_queue().await.snapshot();
    assert_eq!(metrics.tasks_acked, 1);
    assert_eq!(h.blobs.inner().effective_deletes(), 3);
}

#[tokio::test]
async fn expiry_sweep_deletes_and_reclaims_expired_images() {
    let h = Harness::inline();
    let short = services::upload_image(
        &h.state,
        landscape_jpeg("short.jpg", &["temp"]).with_expiry_minutes(1),
    )
    .await
    .unwrap()
    .image;
    let keeper = h.upload("keeper.jpg", &[]).await.unwrap();

    let later = Utc::now() + ChronoDuration::minutes(5);
    let report = services::sweep_expired(&h.state, later, 100).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);

    let err = services::get_image(&h.state, short.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ImageNotFound);
    services::get_image(&h.state, keeper.id).await.unwrap();
    assert_eq!(h.blobs.inner().len(), 3);

    // Nothing left to sweep.
    let again = services::sweep_expired(&h.state, later, 100).await.unwrap();
    assert_eq!(again.deleted, 0);
}
