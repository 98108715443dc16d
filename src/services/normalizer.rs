//! Bookmark validation and normalization.
//!
//! Every record entering the local store or the merge engine passes through
//! here first, so the rest of the crate can assume a well-formed `url`, a
//! non-empty category and clean hashtags.

use chrono::{DateTime, SubsecRound, Utc};
use url::Url;

use crate::types::bookmark::{iso8601, BookmarkPatch, BookmarkRecord, HashtagInput, RawBookmark, DEFAULT_CATEGORY};
use crate::types::errors::ValidationError;

const MAX_TOKEN_LEN: usize = 128;

/// Normalizes raw input into a record, stamping `dateAdded` with the current time when absent.
pub fn normalize(raw: &RawBookmark) -> Result<BookmarkRecord, ValidationError> {
    normalize_at(raw, Utc::now())
}

/// Same as [`normalize`] with an injected clock.
pub fn normalize_at(raw: &RawBookmark, now: DateTime<Utc>) -> Result<BookmarkRecord, ValidationError> {
    let url = normalize_url(&raw.url)?;
    let date_added = match raw.date_added.as_deref() {
        Some(value) if !value.trim().is_empty() => {
            iso8601::parse(value).ok_or_else(|| ValidationError::InvalidDate(value.to_string()))?
        }
        // Stored timestamps carry milliseconds; match that so a reload compares equal.
        _ => now.trunc_subsecs(3),
    };

    Ok(BookmarkRecord {
        url,
        category: normalize_category(raw.category.as_deref()),
        hashtags: raw.hashtags.as_ref().map(normalize_hashtags).unwrap_or_default(),
        pinned: raw.pinned.unwrap_or(false),
        date_added,
    })
}

/// Applies a partial update. The identity and `dateAdded` of `existing` are kept.
pub fn normalize_update(existing: &BookmarkRecord, patch: &BookmarkPatch) -> BookmarkRecord {
    let mut updated = existing.clone();
    if let Some(category) = patch.category.as_deref() {
        updated.category = normalize_category(Some(category));
    }
    if let Some(hashtags) = patch.hashtags.as_ref() {
        updated.hashtags = normalize_hashtags(hashtags);
    }
    if let Some(pinned) = patch.pinned {
        updated.pinned = pinned;
    }
    updated
}

/// Parses a list of raw JSON values, silently dropping entries that fail validation.
pub fn normalize_collection(values: &[serde_json::Value]) -> Vec<BookmarkRecord> {
    values
        .iter()
        .filter_map(|value| serde_json::from_value::<RawBookmark>(value.clone()).ok())
        .filter_map(|raw| normalize(&raw).ok())
        .collect()
}

/// Returns true when a record built elsewhere still satisfies the URL invariant.
pub fn is_well_formed(record: &BookmarkRecord) -> bool {
    normalize_url(&record.url).map(|u| u == record.url).unwrap_or(false)
}

/// Trims the URL and checks that it is absolute with a host.
///
/// The string is kept as typed (only trimmed) so identity matches what
/// other devices send for the same link.
pub fn normalize_url(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidUrl(input.to_string()));
    }
    match Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() && !parsed.cannot_be_a_base() => Ok(trimmed.to_string()),
        _ => Err(ValidationError::InvalidUrl(input.to_string())),
    }
}

fn normalize_category(input: Option<&str>) -> String {
    match input.map(str::trim) {
        Some(category) if !category.is_empty() => category.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Splits, trims, strips `#`, drops empties and de-duplicates (first occurrence wins).
pub fn normalize_hashtags(input: &HashtagInput) -> Vec<String> {
    let pieces: Vec<&str> = match input {
        HashtagInput::Text(text) => text.split(',').collect(),
        HashtagInput::List(list) => list.iter().map(String::as_str).collect(),
    };

    let mut tags: Vec<String> = Vec::new();
    for piece in pieces {
        let tag = piece.trim().trim_start_matches('#').trim();
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
    }
    tags
}

/// Validates a sync token so it can be used in a relay channel name.
pub fn normalize_token(input: &str) -> Result<String, ValidationError> {
    let token = input.trim();
    let valid = !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(token.to_string())
    } else {
        Err(ValidationError::InvalidToken(input.to_string()))
    }
}
