//! App Core for linksync.
//!
//! Wires settings, the local store, the sync session and the bookmark manager.
//! Every user mutation goes through here so that "commit locally, then
//! publish" is applied uniformly. A sync failure never undoes or fails a
//! committed mutation.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::managers::bookmark_manager::{BookmarkManager, BookmarkManagerTrait, ImportSummary};
use crate::managers::sync_session::{JoinOutcome, SyncSession};
use crate::services::kv_backends::{FileBackend, KvBackend, SqliteBackend};
use crate::services::local_store::LocalStore;
use crate::services::relay::{DisabledRelay, MemoryRelay, RelayClient};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::sync_queue::{QueuePolicy, QueueTicket};
use crate::types::bookmark::{BookmarkPatch, BookmarkRecord, RawBookmark};
use crate::types::errors::{BookmarkError, SettingsError, StorageError, SyncError};
use crate::types::settings::{BackendKind, LinkSyncSettings, RelayMode};
use crate::types::sync::{ChangeOrigin, EventSender, SyncEvent, SyncStatus};

/// SQLite database file inside the data directory.
pub const DATABASE_FILE: &str = "linksync.db";
/// Directory used by the file backend inside the data directory.
pub const FILE_STORE_DIR: &str = "store";

/// A committed local mutation plus the publish it triggered, if bound.
pub struct Applied<T> {
    pub value: T,
    pub publish: Option<QueueTicket>,
}

/// Central application struct.
pub struct App {
    pub store: Arc<LocalStore>,
    pub settings_engine: SettingsEngine,
    pub sync: SyncSession,
    events: EventSender,
}

/// Opens the configured backends under `data_dir`, first one read first.
pub fn open_store(data_dir: &Path, settings: &LinkSyncSettings) -> Result<LocalStore, StorageError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| StorageError::Unavailable(format!("cannot create {}: {}", data_dir.display(), e)))?;
    let mut backends: Vec<Box<dyn KvBackend>> = Vec::new();
    for kind in &settings.storage.backends {
        match kind {
            BackendKind::Sqlite => backends.push(Box::new(SqliteBackend::open(data_dir.join(DATABASE_FILE))?)),
            BackendKind::Files => backends.push(Box::new(FileBackend::open(data_dir.join(FILE_STORE_DIR))?)),
        }
    }
    LocalStore::new(backends)
}

/// Builds the relay client selected in settings.
pub fn build_relay(settings: &LinkSyncSettings) -> Result<Arc<dyn RelayClient>, SyncError> {
    let relay: Arc<dyn RelayClient> = match settings.relay.mode {
        RelayMode::Disabled => Arc::new(DisabledRelay::new("sync relay is disabled in settings")),
        RelayMode::Local => Arc::new(MemoryRelay::new()),
        #[cfg(feature = "network")]
        RelayMode::Pusher => Arc::new(crate::services::pusher_relay::PusherRelay::new(settings.relay.clone())?),
        #[cfg(not(feature = "network"))]
        RelayMode::Pusher => Arc::new(DisabledRelay::new("built without network support")),
    };
    Ok(relay)
}

impl App {
    /// Opens the app with settings from `settings_engine` and storage under `data_dir`.
    /// Must be called from within a tokio runtime.
    pub fn open(
        data_dir: &Path,
        mut settings_engine: SettingsEngine,
        events: EventSender,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = settings_engine.load()?;
        let store = Arc::new(open_store(data_dir, &settings)?);
        let relay = build_relay(&settings)?;
        let mut app = Self::with_parts(store, relay, settings_engine, events)?;

        #[cfg(feature = "network")]
        if let Some(base_url) = settings.remote_store.base_url.as_deref() {
            let remote = crate::services::remote_store::RemoteStore::new(base_url)?;
            app.sync = app.sync.with_remote_store(Arc::new(remote));
        }

        info!(data_dir = %data_dir.display(), relay = ?settings.relay.mode, "linksync opened");
        Ok(app)
    }

    /// Assembles an app from ready-made parts; the queue policy comes from the settings.
    pub fn with_parts(
        store: Arc<LocalStore>,
        relay: Arc<dyn RelayClient>,
        settings_engine: SettingsEngine,
        events: EventSender,
    ) -> Result<Self, SyncError> {
        let policy = QueuePolicy::from(&settings_engine.get_settings().queue);
        let sync = SyncSession::new(store.clone(), relay, policy, events.clone())?;
        Ok(Self {
            store,
            settings_engine,
            sync,
            events,
        })
    }

    /// Rejoins the persisted token, if any. Never fatal for relay problems.
    pub async fn startup(&mut self) -> Result<(), SyncError> {
        self.sync.resume().await?;
        Ok(())
    }

    pub fn bookmarks(&self) -> BookmarkManager<'_> {
        BookmarkManager::new(&self.store)
    }

    /// Emits the change event and publishes the current collection if bound.
    fn after_mutation<T>(&self, value: T) -> Applied<T> {
        let collection = match self.store.current_collection() {
            Ok(collection) => collection,
            Err(e) => {
                warn!(error = %e, "could not reload collection after mutation");
                return Applied { value, publish: None };
            }
        };
        let _ = self.events.send(SyncEvent::CollectionChanged {
            origin: ChangeOrigin::Local,
            count: collection.len(),
        });

        if self.sync.bound_token().is_none() {
            return Applied { value, publish: None };
        }
        match self.sync.publish(&collection) {
            Ok(ticket) => Applied { value, publish: Some(ticket) },
            Err(e) => {
                warn!(error = %e, "could not queue sync publish");
                Applied { value, publish: None }
            }
        }
    }

    pub fn add_bookmark(&self, raw: &RawBookmark) -> Result<Applied<BookmarkRecord>, BookmarkError> {
        let record = self.bookmarks().add_bookmark(raw)?;
        self.sync.save_to_remote_store(&record);
        Ok(self.after_mutation(record))
    }

    pub fn update_bookmark(&self, url: &str, patch: &BookmarkPatch) -> Result<Applied<BookmarkRecord>, BookmarkError> {
        let record = self.bookmarks().update_bookmark(url, patch)?;
        Ok(self.after_mutation(record))
    }

    pub fn remove_bookmark(&self, url: &str) -> Result<Applied<BookmarkRecord>, BookmarkError> {
        let record = self.bookmarks().remove_bookmark(url)?;
        Ok(self.after_mutation(record))
    }

    pub fn toggle_pin(&self, url: &str) -> Result<Applied<BookmarkRecord>, BookmarkError> {
        let record = self.bookmarks().toggle_pin(url)?;
        Ok(self.after_mutation(record))
    }

    pub fn import_json(&self, json: &str) -> Result<Applied<ImportSummary>, BookmarkError> {
        let summary = self.bookmarks().import_json(json)?;
        Ok(self.after_mutation(summary))
    }

    pub async fn generate_token(&mut self) -> Result<JoinOutcome, SyncError> {
        self.sync.generate().await
    }

    pub async fn join(&mut self, token: &str) -> Result<JoinOutcome, SyncError> {
        self.sync.join(token).await
    }

    pub async fn leave(&mut self) -> Result<(), SyncError> {
        self.sync.leave().await
    }

    pub fn sync_status(&self) -> Result<SyncStatus, SyncError> {
        self.sync.status()
    }

    /// Relay, storage and queue changes take effect on the next start.
    pub fn set_setting(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        self.settings_engine.set_value(key, value)?;
        if !key.starts_with("logging.") {
            info!(key, "setting saved; applies on next start");
        }
        Ok(())
    }
}
