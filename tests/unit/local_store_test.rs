//! Unit tests for the Local Store and its key-value backends.
//!
//! Durability is checked against real files in a temp directory; quota
//! behaviour uses the in-memory backend.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use linksync::services::kv_backends::{FileBackend, KvBackend, MemoryBackend, SqliteBackend};
use linksync::services::local_store::{
    token_snapshot_key, version_key, LocalStore, ACTIVE_TOKEN_KEY, CURRENT_COLLECTION_KEY, DEVICE_ID_KEY,
};
use linksync::types::bookmark::BookmarkRecord;
use linksync::types::errors::StorageError;

fn record(url: &str) -> BookmarkRecord {
    BookmarkRecord {
        url: url.to_string(),
        category: "Uncategorized".to_string(),
        hashtags: vec!["rust".to_string()],
        pinned: false,
        date_added: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

#[test]
fn test_key_layout() {
    assert_eq!(CURRENT_COLLECTION_KEY, "current-collection");
    assert_eq!(ACTIVE_TOKEN_KEY, "active-token");
    assert_eq!(DEVICE_ID_KEY, "device-id");
    assert_eq!(token_snapshot_key("tok1"), "token-snapshot:tok1");
    assert_eq!(version_key("tok1"), "version:tok1");
}

#[test]
fn test_raw_get_set_delete() {
    let store = LocalStore::in_memory();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", b"v").unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    store.delete("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
    // Deleting a missing key is fine.
    store.delete("k").unwrap();
}

#[test]
fn test_empty_store_has_empty_collection() {
    let store = LocalStore::in_memory();
    assert!(store.current_collection().unwrap().is_empty());
    assert_eq!(store.active_token().unwrap(), None);
    assert_eq!(store.token_snapshot("tok1").unwrap(), None);
    assert_eq!(store.version("tok1").unwrap(), 0);
}

#[test]
fn test_device_id_is_generated_once() {
    let store = LocalStore::in_memory();
    let first = store.device_id().unwrap();
    assert!(first.starts_with("device_"));
    assert_eq!(store.device_id().unwrap(), first);
}

#[test]
fn test_bump_version_is_per_token() {
    let store = LocalStore::in_memory();
    assert_eq!(store.bump_version("a").unwrap(), 1);
    assert_eq!(store.bump_version("a").unwrap(), 2);
    assert_eq!(store.bump_version("b").unwrap(), 1);
    assert_eq!(store.version("a").unwrap(), 2);
}

#[test]
fn test_commit_writes_current_and_snapshot_together() {
    let store = LocalStore::in_memory();
    let records = vec![record("https://a.example")];
    store.commit_collection(Some("tok1"), &records).unwrap();
    assert_eq!(store.current_collection().unwrap(), records);
    assert_eq!(store.token_snapshot("tok1").unwrap(), Some(records));
}

#[test]
fn test_commit_without_token_leaves_snapshots_alone() {
    let store = LocalStore::in_memory();
    store.commit_collection(None, &[record("https://a.example")]).unwrap();
    assert_eq!(store.token_snapshot("tok1").unwrap(), None);
}

#[test]
fn test_update_collection_commits_for_active_token() {
    let store = LocalStore::in_memory();
    store.set_active_token("tok1").unwrap();
    let ((), committed) = store
        .update_collection(|records| {
            records.push(record("https://a.example"));
            Ok::<_, StorageError>(())
        })
        .unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(store.token_snapshot("tok1").unwrap(), Some(committed));
}

#[test]
fn test_update_collection_error_writes_nothing() {
    let store = LocalStore::in_memory();
    let result: Result<((), Vec<BookmarkRecord>), StorageError> = store.update_collection(|records| {
        records.push(record("https://a.example"));
        Err(StorageError::Unavailable("abort".to_string()))
    });
    assert!(result.is_err());
    assert!(store.current_collection().unwrap().is_empty());
}

#[test]
fn test_corrupt_collection_is_reported() {
    let store = LocalStore::in_memory();
    store.set(CURRENT_COLLECTION_KEY, b"{not json").unwrap();
    assert!(matches!(store.current_collection(), Err(StorageError::Corrupt(_))));
}

#[test]
fn test_clear_active_token() {
    let store = LocalStore::in_memory();
    store.set_active_token("tok1").unwrap();
    assert_eq!(store.active_token().unwrap().as_deref(), Some("tok1"));
    store.clear_active_token().unwrap();
    assert_eq!(store.active_token().unwrap(), None);
}

#[test]
fn test_store_requires_a_backend() {
    assert!(matches!(LocalStore::new(Vec::new()), Err(StorageError::Unavailable(_))));
}

#[test]
fn test_quota_exhaustion_is_storage_unavailable() {
    let store = LocalStore::new(vec![Box::new(MemoryBackend::with_quota(64))]).unwrap();
    let many: Vec<BookmarkRecord> = (0..10).map(|i| record(&format!("https://site{}.example", i))).collect();
    let err = store.commit_collection(None, &many).unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(store.current_collection().unwrap().is_empty());
}

#[test]
fn test_sqlite_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("linksync.db");
    let records = vec![record("https://a.example")];
    let device_id = {
        let store = LocalStore::new(vec![Box::new(SqliteBackend::open(&path).unwrap())]).unwrap();
        store.set_active_token("tok1").unwrap();
        store.commit_collection(Some("tok1"), &records).unwrap();
        store.device_id().unwrap()
    };

    let store = LocalStore::new(vec![Box::new(SqliteBackend::open(&path).unwrap())]).unwrap();
    assert_eq!(store.current_collection().unwrap(), records);
    assert_eq!(store.active_token().unwrap().as_deref(), Some("tok1"));
    assert_eq!(store.device_id().unwrap(), device_id);
}

#[test]
fn test_file_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let records = vec![record("https://a.example")];
    {
        let store = LocalStore::new(vec![Box::new(FileBackend::open(tmp.path()).unwrap())]).unwrap();
        store.commit_collection(Some("tok:with/odd chars"), &records).unwrap();
    }
    let store = LocalStore::new(vec![Box::new(FileBackend::open(tmp.path()).unwrap())]).unwrap();
    assert_eq!(store.token_snapshot("tok:with/odd chars").unwrap(), Some(records));
}

#[test]
fn test_writes_fan_out_and_reads_fall_back() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    {
        let store = LocalStore::new(vec![
            Box::new(SqliteBackend::open(tmp.path().join("a.db")).unwrap()),
            Box::new(FileBackend::open(&files_dir).unwrap()),
        ])
        .unwrap();
        store.set("k", b"v").unwrap();
    }

    // The file backend alone still has the value.
    let files = FileBackend::open(&files_dir).unwrap();
    assert_eq!(files.get("k").unwrap(), Some(b"v".to_vec()));

    // An empty first backend falls through to the second.
    let store = LocalStore::new(vec![Box::new(MemoryBackend::new()), Box::new(files)]).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
}
