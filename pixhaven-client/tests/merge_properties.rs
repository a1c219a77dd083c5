//! Property tests for the first-page prediction merge.

use std::collections::HashSet;

use pixhaven_client::{merge_first_page, ClientPredictionCache};
use pixhaven_core::{ImageId, ImageListPage, PageRequest};
use pixhaven_test_utils::generators::{arb_image_filters, arb_image_record};
use proptest::prelude::*;

fn arb_page() -> impl Strategy<Value = ImageListPage> {
    (
        prop::collection::vec(arb_image_record(), 0..12),
        1u32..=12,
        0u64..40,
    )
        .prop_map(|(mut images, limit, extra)| {
            images.truncate(limit as usize);
            let total = images.len() as u64 + extra;
            ImageListPage::new(images, PageRequest::new(1, limit), total)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_merge_bounds_and_counts(
        base in arb_page(),
        predicted in prop::collection::vec(arb_image_record(), 0..6),
    ) {
        let merged = merge_first_page(&predicted, &base);

        let ids: Vec<ImageId> = merged.images.iter().map(|i| i.id).collect();
        let unique: HashSet<ImageId> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), ids.len());
        prop_assert!(merged.images.len() <= base.limit as usize);
        prop_assert!(merged.total_pages >= 1);

        let base_ids: HashSet<ImageId> = base.images.iter().map(|i| i.id).collect();
        let unseen = predicted.iter().filter(|p| !base_ids.contains(&p.id)).count() as u64;
        prop_assert_eq!(merged.total, base.total + unseen);

        // Predictions lead, in the order given.
        for (slot, record) in predicted.iter().take(base.limit as usize).enumerate() {
            prop_assert_eq!(merged.images[slot].id, record.id);
        }
    }

    #[test]
    fn prop_merging_twice_changes_nothing(
        base in arb_page(),
        predicted in prop::collection::vec(arb_image_record(), 0..6),
    ) {
        let once = merge_first_page(&predicted, &base);
        // Re-applying against an authoritative page that already lists the
        // visible predictions must not count them again.
        let twice = merge_first_page(&predicted, &once);
        prop_assert_eq!(&twice.images, &once.images);
        let hidden = predicted
            .iter()
            .filter(|p| !once.images.iter().any(|i| i.id == p.id))
            .count() as u64;
        prop_assert_eq!(twice.total, once.total + hidden);
    }

    #[test]
    fn prop_projection_matches_filters(
        records in prop::collection::vec(arb_image_record(), 0..10),
        filters in arb_image_filters(),
    ) {
        let mut cache = ClientPredictionCache::new(16);
        cache.record(records.clone());
        for record in cache.project(&filters) {
            prop_assert!(filters.normalized().matches(&record));
        }
        let expected = records.iter().filter(|r| filters.normalized().matches(r)).count();
        prop_assert_eq!(cache.project(&filters).len(), expected);
    }
}
