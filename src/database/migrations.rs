//! Versioned schema for the linksync database.
//!
//! Migrations are listed in [`MIGRATIONS`] in version order. Each one runs in
//! its own transaction together with the `schema_version` row that records it,
//! so a crash never leaves a half-applied step.

use rusqlite::{params, Connection};
use tracing::info;

/// One schema step: version, description, SQL.
type Migration = (i32, &'static str, &'static str);

const MIGRATIONS: &[Migration] = &[(
    1,
    "Key-value store for collections and sync metadata",
    "CREATE TABLE IF NOT EXISTS kv_store (
         key TEXT PRIMARY KEY,
         value BLOB NOT NULL,
         updated_at INTEGER NOT NULL
     );",
)];

/// Highest version in [`MIGRATIONS`].
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The highest applied version, or 0 on a fresh file.
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0)
}

/// Applies every migration newer than the recorded version.
pub fn run_all(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Journal mode is per file, not per version, so it is set on every open.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL,
             description TEXT NOT NULL
         );",
    )?;

    let current = get_schema_version(conn);
    for (version, description, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        let applied = conn.execute_batch(sql).and_then(|_| {
            conn.execute(
                "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
                params![version, chrono::Utc::now().timestamp(), description],
            )
        });
        match applied {
            Ok(_) => conn.execute_batch("COMMIT;")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(e);
            }
        }
        info!(version, description, "applied schema migration");
    }
    Ok(())
}
