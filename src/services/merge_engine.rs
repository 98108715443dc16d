//! Merge Engine for linksync.
//!
//! Reconciles two bookmark collections by URL identity. For a URL present on
//! both sides the record with the strictly later `dateAdded` wins wholesale;
//! on an exact tie the remote record wins. Output is ordered by `dateAdded`
//! descending, then URL, so repeated merges produce byte-identical snapshots.

use std::collections::HashMap;

use tracing::debug;

use crate::services::normalizer::{is_well_formed, normalize_collection};
use crate::types::bookmark::BookmarkRecord;

/// What a merge did to the local side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Remote URLs that were not present locally.
    pub added: usize,
    /// Local records replaced by a remote record for the same URL.
    pub replaced: usize,
    /// Local records kept because they were strictly newer.
    pub kept: usize,
    /// Entries dropped because they failed validation.
    pub dropped: usize,
}

impl MergeReport {
    /// True when the merge result differs from the (well-formed, deduplicated) local input.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Merges `remote` into `local` and returns the combined collection.
pub fn merge(local: &[BookmarkRecord], remote: &[BookmarkRecord]) -> Vec<BookmarkRecord> {
    merge_with_report(local, remote).0
}

/// Merges raw remote JSON entries (as carried by a sync message) into `local`.
pub fn merge_raw(local: &[BookmarkRecord], remote: &[serde_json::Value]) -> (Vec<BookmarkRecord>, MergeReport) {
    let parsed = normalize_collection(remote);
    let malformed = remote.len() - parsed.len();
    let (merged, mut report) = merge_with_report(local, &parsed);
    report.dropped += malformed;
    (merged, report)
}

/// Merges and reports how many records were added, replaced or kept.
pub fn merge_with_report(local: &[BookmarkRecord], remote: &[BookmarkRecord]) -> (Vec<BookmarkRecord>, MergeReport) {
    let mut report = MergeReport::default();
    let mut by_url: HashMap<&str, &BookmarkRecord> = HashMap::with_capacity(local.len() + remote.len());

    for record in local {
        if !is_well_formed(record) {
            report.dropped += 1;
            continue;
        }
        // A duplicate inside one collection resolves like a conflict, later position as "remote".
        match by_url.get(record.url.as_str()) {
            Some(existing) if existing.date_added > record.date_added => {}
            _ => {
                by_url.insert(record.url.as_str(), record);
            }
        }
    }

    for record in remote {
        if !is_well_formed(record) {
            report.dropped += 1;
            continue;
        }
        match by_url.get(record.url.as_str()) {
            None => {
                report.added += 1;
                by_url.insert(record.url.as_str(), record);
            }
            Some(existing) if existing.date_added > record.date_added => {
                report.kept += 1;
            }
            Some(existing) => {
                if *existing != record {
                    report.replaced += 1;
                }
                by_url.insert(record.url.as_str(), record);
            }
        }
    }

    let mut merged: Vec<BookmarkRecord> = by_url.into_values().cloned().collect();
    sort_for_display(&mut merged);

    debug!(
        local = local.len(),
        remote = remote.len(),
        merged = merged.len(),
        added = report.added,
        replaced = report.replaced,
        dropped = report.dropped,
        "merged bookmark collections"
    );

    (merged, report)
}

/// Newest first; URL breaks ties so the order is total.
pub fn sort_for_display(records: &mut [BookmarkRecord]) {
    records.sort_by(|a, b| {
        b.date_added
            .cmp(&a.date_added)
            .then_with(|| a.url.cmp(&b.url))
    });
}
