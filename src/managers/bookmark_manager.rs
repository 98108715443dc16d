//! Bookmark Manager for linksync.
//!
//! Implements `BookmarkManagerTrait`: local CRUD over the current collection
//! held by [`LocalStore`]. Every mutation is one atomic read-modify-write of
//! the collection, committed together with the active token's snapshot.
//! Publishing the result to other devices is the caller's job (see `App`).

use tracing::info;

use crate::services::local_store::LocalStore;
use crate::services::merge_engine::merge_with_report;
use crate::services::normalizer::{normalize, normalize_collection, normalize_update, normalize_url};
use crate::types::bookmark::{BookmarkPatch, BookmarkRecord, RawBookmark};
use crate::types::errors::BookmarkError;

/// Outcome of a JSON import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Trait defining bookmark management operations.
pub trait BookmarkManagerTrait {
    fn add_bookmark(&self, raw: &RawBookmark) -> Result<BookmarkRecord, BookmarkError>;
    fn update_bookmark(&self, url: &str, patch: &BookmarkPatch) -> Result<BookmarkRecord, BookmarkError>;
    fn remove_bookmark(&self, url: &str) -> Result<BookmarkRecord, BookmarkError>;
    fn toggle_pin(&self, url: &str) -> Result<BookmarkRecord, BookmarkError>;
    fn list_bookmarks(&self, category: Option<&str>) -> Result<Vec<BookmarkRecord>, BookmarkError>;
    fn pinned_bookmarks(&self) -> Result<Vec<BookmarkRecord>, BookmarkError>;
    fn search_bookmarks(&self, query: &str) -> Result<Vec<BookmarkRecord>, BookmarkError>;
    fn categories(&self) -> Result<Vec<String>, BookmarkError>;
    fn export_json(&self) -> Result<String, BookmarkError>;
    fn import_json(&self, json: &str) -> Result<ImportSummary, BookmarkError>;
}

/// Bookmark manager borrowing the device's local store.
pub struct BookmarkManager<'a> {
    store: &'a LocalStore,
}

impl<'a> BookmarkManager<'a> {
    pub fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Applies `f` to the record stored under `url` and commits.
    fn modify<F>(&self, url: &str, f: F) -> Result<BookmarkRecord, BookmarkError>
    where
        F: FnOnce(&BookmarkRecord) -> BookmarkRecord,
    {
        let url = normalize_url(url)?;
        let (updated, _) = self.store.update_collection(|records| {
            let slot = records
                .iter_mut()
                .find(|r| r.url == url)
                .ok_or_else(|| BookmarkError::NotFound(url.clone()))?;
            *slot = f(slot);
            Ok::<_, BookmarkError>(slot.clone())
        })?;
        Ok(updated)
    }
}

impl<'a> BookmarkManagerTrait for BookmarkManager<'a> {
    /// Adds a new bookmark. A URL that is already saved is rejected, not overwritten.
    fn add_bookmark(&self, raw: &RawBookmark) -> Result<BookmarkRecord, BookmarkError> {
        let record = normalize(raw)?;
        let (added, _) = self.store.update_collection(|records| {
            if records.iter().any(|r| r.url == record.url) {
                return Err(BookmarkError::DuplicateUrl(record.url.clone()));
            }
            records.push(record.clone());
            Ok(record.clone())
        })?;
        info!(url = %added.url, category = %added.category, "bookmark added");
        Ok(added)
    }

    /// Updates category, hashtags or pin state. `dateAdded` never changes.
    fn update_bookmark(&self, url: &str, patch: &BookmarkPatch) -> Result<BookmarkRecord, BookmarkError> {
        self.modify(url, |existing| normalize_update(existing, patch))
    }

    fn remove_bookmark(&self, url: &str) -> Result<BookmarkRecord, BookmarkError> {
        let url = normalize_url(url)?;
        let (removed, _) = self.store.update_collection(|records| {
            let index = records
                .iter()
                .position(|r| r.url == url)
                .ok_or_else(|| BookmarkError::NotFound(url.clone()))?;
            Ok::<_, BookmarkError>(records.remove(index))
        })?;
        info!(url = %removed.url, "bookmark removed");
        Ok(removed)
    }

    fn toggle_pin(&self, url: &str) -> Result<BookmarkRecord, BookmarkError> {
        self.modify(url, |existing| {
            let mut toggled = existing.clone();
            toggled.pinned = !toggled.pinned;
            toggled
        })
    }

    /// Lists bookmarks newest first, optionally restricted to one category (case-insensitive).
    fn list_bookmarks(&self, category: Option<&str>) -> Result<Vec<BookmarkRecord>, BookmarkError> {
        let records = self.store.current_collection()?;
        Ok(match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => records
                .into_iter()
                .filter(|r| r.category.eq_ignore_ascii_case(category))
                .collect(),
            None => records,
        })
    }

    fn pinned_bookmarks(&self) -> Result<Vec<BookmarkRecord>, BookmarkError> {
        Ok(self
            .store
            .current_collection()?
            .into_iter()
            .filter(|r| r.pinned)
            .collect())
    }

    /// Case-insensitive substring match on URL, category and hashtags.
    /// A leading `#` in the query matches hashtags only.
    fn search_bookmarks(&self, query: &str) -> Result<Vec<BookmarkRecord>, BookmarkError> {
        let query = query.trim().to_lowercase();
        let records = self.store.current_collection()?;
        if query.is_empty() {
            return Ok(records);
        }

        let matches = |r: &BookmarkRecord| -> bool {
            if let Some(tag) = query.strip_prefix('#') {
                return r.hashtags.iter().any(|h| h.to_lowercase().contains(tag));
            }
            r.url.to_lowercase().contains(&query)
                || r.category.to_lowercase().contains(&query)
                || r.hashtags.iter().any(|h| h.to_lowercase().contains(&query))
        };
        Ok(records.into_iter().filter(|r| matches(r)).collect())
    }

    /// Distinct categories, sorted case-insensitively.
    fn categories(&self) -> Result<Vec<String>, BookmarkError> {
        let mut categories: Vec<String> = Vec::new();
        for record in self.store.current_collection()? {
            if !categories.iter().any(|c| c.eq_ignore_ascii_case(&record.category)) {
                categories.push(record.category);
            }
        }
        categories.sort_by_key(|c| c.to_lowercase());
        Ok(categories)
    }

    fn export_json(&self) -> Result<String, BookmarkError> {
        let records = self.store.current_collection()?;
        serde_json::to_string_pretty(&records).map_err(|e| BookmarkError::Import(e.to_string()))
    }

    /// Imports a JSON array of bookmarks, merging by URL like a remote snapshot.
    /// Invalid entries are skipped and counted.
    fn import_json(&self, json: &str) -> Result<ImportSummary, BookmarkError> {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(json).map_err(|e| BookmarkError::Import(e.to_string()))?;
        let incoming = normalize_collection(&values);
        let skipped = values.len() - incoming.len();

        let (imported, records) = self.store.update_collection(|records| {
            let (merged, report) = merge_with_report(records, &incoming);
            *records = merged;
            Ok::<_, BookmarkError>(report.added + report.replaced)
        })?;

        info!(imported, skipped, "bookmarks imported");
        Ok(ImportSummary {
            imported,
            skipped,
            total: records.len(),
        })
    }
}
