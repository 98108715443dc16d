//! Property-based tests for the merge engine.
//!
//! These verify the algebraic behaviour the sync protocol relies on: merging
//! is idempotent, the empty collection is an identity, URLs stay unique, no
//! URL is ever lost, and two devices exchanging snapshots converge.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use linksync::services::merge_engine::merge;
use linksync::types::bookmark::BookmarkRecord;

/// Small URL space so that conflicts are common.
fn arb_url() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("https://site{}.example/", n))
}

fn arb_record() -> impl Strategy<Value = BookmarkRecord> {
    (arb_url(), 0i64..20, any::<bool>(), prop_oneof![Just("Work"), Just("Home"), Just("Uncategorized")]).prop_map(
        |(url, minutes, pinned, category)| BookmarkRecord {
            url,
            category: category.to_string(),
            hashtags: Vec::new(),
            pinned,
            date_added: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
        },
    )
}

fn arb_collection() -> impl Strategy<Value = Vec<BookmarkRecord>> {
    proptest::collection::vec(arb_record(), 0..10)
}

/// Collections without duplicate URLs, as the store holds them.
fn arb_store_collection() -> impl Strategy<Value = Vec<BookmarkRecord>> {
    arb_collection().prop_map(|c| merge(&c, &[]))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_is_idempotent(a in arb_store_collection()) {
        prop_assert_eq!(merge(&a, &a), a);
    }

    #[test]
    fn empty_is_identity(a in arb_store_collection()) {
        prop_assert_eq!(merge(&a, &[]), a.clone());
        prop_assert_eq!(merge(&[], &a), a);
    }

    #[test]
    fn urls_are_unique_and_none_are_lost(a in arb_collection(), b in arb_collection()) {
        let merged = merge(&a, &b);
        let mut urls: Vec<&str> = merged.iter().map(|r| r.url.as_str()).collect();
        let before = urls.len();
        urls.sort();
        urls.dedup();
        prop_assert_eq!(urls.len(), before);
        for r in a.iter().chain(b.iter()) {
            prop_assert!(merged.iter().any(|m| m.url == r.url));
        }
    }

    #[test]
    fn winner_has_the_latest_date(a in arb_store_collection(), b in arb_store_collection()) {
        let merged = merge(&a, &b);
        for m in &merged {
            let latest = a.iter().chain(b.iter()).filter(|r| r.url == m.url).map(|r| r.date_added).max();
            prop_assert_eq!(Some(m.date_added), latest);
        }
    }

    /// Two devices that each merge the other's snapshot end up with the same
    /// set of URLs and dates. Only exact-tie records may differ, since each
    /// side prefers whatever it received.
    #[test]
    fn exchanging_snapshots_converges(a in arb_store_collection(), b in arb_store_collection()) {
        let on_a = merge(&a, &b);
        let on_b = merge(&b, &a);
        let key = |c: &Vec<BookmarkRecord>| c.iter().map(|r| (r.url.clone(), r.date_added)).collect::<Vec<_>>();
        prop_assert_eq!(key(&on_a), key(&on_b));

        // Re-applying the peer's result reproduces it exactly, so no further change propagates.
        prop_assert_eq!(merge(&on_a, &on_b), on_b.clone());
        prop_assert_eq!(merge(&on_b, &on_a), on_a.clone());
    }

    #[test]
    fn merge_is_deterministic(a in arb_collection(), b in arb_collection()) {
        prop_assert_eq!(merge(&a, &b), merge(&a, &b));
    }
}
