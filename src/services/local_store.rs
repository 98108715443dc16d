//! Local Store for linksync.
//!
//! Typed persistence of the bookmark collection and sync metadata over one or
//! more [`KvBackend`]s. Writes go to every backend; reads come from the first
//! backend that holds the key. The store lock is the single serialization
//! point for the mutation path and the inbound sync path.

use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::kv_backends::{KvBackend, MemoryBackend};
use crate::services::merge_engine::sort_for_display;
use crate::types::bookmark::BookmarkRecord;
use crate::types::errors::StorageError;

pub const CURRENT_COLLECTION_KEY: &str = "current-collection";
pub const ACTIVE_TOKEN_KEY: &str = "active-token";
pub const DEVICE_ID_KEY: &str = "device-id";

/// Key of the per-token snapshot.
pub fn token_snapshot_key(token: &str) -> String {
    format!("token-snapshot:{}", token)
}

/// Key of the per-token publish counter.
pub fn version_key(token: &str) -> String {
    format!("version:{}", token)
}

/// Persistent, shared view of the device's bookmarks and sync metadata.
pub struct LocalStore {
    backends: Mutex<Vec<Box<dyn KvBackend>>>,
}

/// Exclusive access to the store for a read-modify-write sequence.
pub struct StoreGuard<'a> {
    backends: MutexGuard<'a, Vec<Box<dyn KvBackend>>>,
}

impl LocalStore {
    /// Creates a store writing to every backend in `backends`; the first is read first.
    pub fn new(backends: Vec<Box<dyn KvBackend>>) -> Result<Self, StorageError> {
        if backends.is_empty() {
            return Err(StorageError::Unavailable("no storage backend configured".to_string()));
        }
        Ok(Self {
            backends: Mutex::new(backends),
        })
    }

    /// A volatile store, for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self {
            backends: Mutex::new(vec![Box::new(MemoryBackend::new())]),
        }
    }

    /// Locks the store for a sequence of reads and writes.
    pub fn lock(&self) -> Result<StoreGuard<'_>, StorageError> {
        let backends = self
            .backends
            .lock()
            .map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))?;
        Ok(StoreGuard { backends })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.lock()?.get(key)
    }

    pub fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.lock()?.set(key, value)
    }

    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.delete(key)
    }

    pub fn current_collection(&self) -> Result<Vec<BookmarkRecord>, StorageError> {
        self.lock()?.current_collection()
    }

    pub fn token_snapshot(&self, token: &str) -> Result<Option<Vec<BookmarkRecord>>, StorageError> {
        self.lock()?.token_snapshot(token)
    }

    pub fn active_token(&self) -> Result<Option<String>, StorageError> {
        self.lock()?.active_token()
    }

    pub fn set_active_token(&self, token: &str) -> Result<(), StorageError> {
        self.lock()?.set(ACTIVE_TOKEN_KEY, token.as_bytes())
    }

    pub fn clear_active_token(&self) -> Result<(), StorageError> {
        self.lock()?.delete(ACTIVE_TOKEN_KEY)
    }

    /// Returns the device id, generating and persisting one on first use.
    pub fn device_id(&self) -> Result<String, StorageError> {
        let mut guard = self.lock()?;
        if let Some(existing) = guard.get_string(DEVICE_ID_KEY)? {
            return Ok(existing);
        }
        let id = format!("device_{}", Uuid::new_v4().simple());
        guard.set(DEVICE_ID_KEY, id.as_bytes())?;
        debug!(device_id = %id, "generated device id");
        Ok(id)
    }

    pub fn version(&self, token: &str) -> Result<u64, StorageError> {
        self.lock()?.version(token)
    }

    /// Increments and returns the publish counter for `token`.
    pub fn bump_version(&self, token: &str) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let next = guard.version(token)? + 1;
        guard.set_json(&version_key(token), &next)?;
        Ok(next)
    }

    /// Writes `records` as the current collection and, when given, as `token`'s snapshot.
    pub fn commit_collection(&self, token: Option<&str>, records: &[BookmarkRecord]) -> Result<(), StorageError> {
        self.lock()?.commit_collection(token, records)
    }

    /// Atomically transforms the current collection and commits the result
    /// for the active token. Returns whatever the closure returned plus the
    /// committed collection.
    pub fn update_collection<T, E, F>(&self, f: F) -> Result<(T, Vec<BookmarkRecord>), E>
    where
        F: FnOnce(&mut Vec<BookmarkRecord>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut guard = self.lock()?;
        let mut records = guard.current_collection()?;
        let out = f(&mut records)?;
        sort_for_display(&mut records);
        let token = guard.active_token()?;
        guard.commit_collection(token.as_deref(), &records)?;
        Ok((out, records))
    }
}

impl StoreGuard<'_> {
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut last_error = None;
        for backend in self.backends.iter() {
            match backend.get(key) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => {
                    warn!(backend = backend.name(), key, error = %e, "storage read failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        for backend in self.backends.iter_mut() {
            backend.set(key, value).map_err(|e| {
                warn!(backend = backend.name(), key, error = %e, "storage write failed");
                e
            })?;
        }
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        for backend in self.backends.iter_mut() {
            backend.delete(key)?;
        }
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.set(key, &bytes)
    }

    pub fn current_collection(&self) -> Result<Vec<BookmarkRecord>, StorageError> {
        Ok(self.get_json(CURRENT_COLLECTION_KEY)?.unwrap_or_default())
    }

    pub fn token_snapshot(&self, token: &str) -> Result<Option<Vec<BookmarkRecord>>, StorageError> {
        self.get_json(&token_snapshot_key(token))
    }

    pub fn active_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.get_string(ACTIVE_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn version(&self, token: &str) -> Result<u64, StorageError> {
        Ok(self.get_json(&version_key(token))?.unwrap_or(0))
    }

    /// Snapshot first, so a failure between the two writes never leaves the
    /// current collection ahead of the token snapshot it will be reloaded from.
    pub fn commit_collection(&mut self, token: Option<&str>, records: &[BookmarkRecord]) -> Result<(), StorageError> {
        if let Some(token) = token {
            self.set_json(&token_snapshot_key(token), records)?;
        }
        self.set_json(CURRENT_COLLECTION_KEY, records)
    }
}
