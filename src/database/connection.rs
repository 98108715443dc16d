//! The SQLite file behind the `sqlite` storage backend.
//!
//! [`Database`] owns one connection, brings the schema up to date on open and
//! exposes the three statements the key-value layer needs.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;

/// How long a write waits on a lock held by another process (a second
/// linksync instance on the same data directory) before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens or creates the database file and applies pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        Self::prepare(Connection::open(path)?)
    }

    /// A private database that disappears on drop.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_all(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The stored bytes for `key`, if any.
    pub fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
    }

    /// Inserts or overwrites `key`, stamping the write time.
    pub fn write_entry(&self, key: &str, value: &[u8]) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Removes `key`. Returns whether a row existed.
    pub fn remove_entry(&self, key: &str) -> Result<bool, rusqlite::Error> {
        let removed = self.conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
