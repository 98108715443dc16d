//! Property-based tests for Bookmark Manager operations.
//!
//! For arbitrary valid URLs: adding then searching finds the bookmark,
//! URLs stay unique however often they are re-added, and toggling a pin
//! twice is a no-op.

use linksync::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait};
use linksync::services::local_store::LocalStore;
use linksync::types::bookmark::RawBookmark;
use proptest::prelude::*;

/// Valid URLs with an http/https scheme, alphanumeric host and optional path.
fn arb_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("https"), Just("http")],
        "[a-z][a-z0-9]{2,15}",
        prop_oneof![Just(".com"), Just(".org"), Just(".net"), Just(".io")],
        proptest::option::of("/[a-z0-9]{1,10}"),
    )
        .prop_map(|(scheme, host, tld, path)| format!("{}://{}{}{}", scheme, host, tld, path.unwrap_or_default()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn add_then_search_by_host_finds_it(url in arb_url()) {
        let store = LocalStore::in_memory();
        let mgr = BookmarkManager::new(&store);
        mgr.add_bookmark(&RawBookmark::from_url(&url)).unwrap();

        let host = url.split("://").nth(1).unwrap().split('/').next().unwrap();
        let results = mgr.search_bookmarks(host).unwrap();
        prop_assert!(results.iter().any(|r| r.url == url));
    }

    #[test]
    fn urls_stay_unique(urls in proptest::collection::vec(arb_url(), 1..15)) {
        let store = LocalStore::in_memory();
        let mgr = BookmarkManager::new(&store);
        for url in &urls {
            let _ = mgr.add_bookmark(&RawBookmark::from_url(url));
        }
        let mut distinct = urls.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(mgr.list_bookmarks(None).unwrap().len(), distinct.len());
    }

    #[test]
    fn toggle_pin_twice_is_identity(url in arb_url()) {
        let store = LocalStore::in_memory();
        let mgr = BookmarkManager::new(&store);
        mgr.add_bookmark(&RawBookmark::from_url(&url)).unwrap();
        let before = mgr.list_bookmarks(None).unwrap();
        mgr.toggle_pin(&url).unwrap();
        mgr.toggle_pin(&url).unwrap();
        prop_assert_eq!(mgr.list_bookmarks(None).unwrap(), before);
    }
}
