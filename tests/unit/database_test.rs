//! Unit tests for the SQLite layer: migrations and the key-value entry statements.

use linksync::database::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use linksync::database::Database;
use tempfile::TempDir;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_kv_store() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let exists: bool = db
        .connection()
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='kv_store'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(exists, "kv_store should exist after migrations");
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(get_schema_version(db.connection()), CURRENT_SCHEMA_VERSION);
}

/// Reopening an existing file must not re-run or duplicate migrations.
#[test]
fn test_reopen_keeps_version_and_data() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("linksync.db");

    {
        let db = Database::open(&path).unwrap();
        db.connection()
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES ('device-id', X'6162', 0)",
                [],
            )
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let versions: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, CURRENT_SCHEMA_VERSION as i64);

    let value: Vec<u8> = db
        .connection()
        .query_row("SELECT value FROM kv_store WHERE key = 'device-id'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(value, b"ab".to_vec());
}

#[test]
fn test_kv_store_key_is_unique() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    conn.execute("INSERT INTO kv_store (key, value, updated_at) VALUES ('k', X'00', 0)", [])
        .unwrap();
    let dup = conn.execute("INSERT INTO kv_store (key, value, updated_at) VALUES ('k', X'01', 0)", []);
    assert!(dup.is_err());
}

#[test]
fn test_entry_write_overwrite_remove() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.read_entry("active-token").unwrap(), None);

    db.write_entry("active-token", b"tok1").unwrap();
    db.write_entry("active-token", b"tok2").unwrap();
    assert_eq!(db.read_entry("active-token").unwrap(), Some(b"tok2".to_vec()));

    assert!(db.remove_entry("active-token").unwrap());
    assert!(!db.remove_entry("active-token").unwrap());
    assert_eq!(db.read_entry("active-token").unwrap(), None);
}
