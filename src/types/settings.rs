use serde::{Deserialize, Serialize};

/// Top-level linksync settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LinkSyncSettings {
    pub relay: RelaySettings,
    pub remote_store: RemoteStoreSettings,
    pub queue: QueueSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Which pub/sub relay the sync session talks to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// No relay; sync is unavailable and the app runs local-only.
    Disabled,
    /// In-process relay hub; sessions in the same process see each other.
    Local,
    /// Pusher websocket subscription plus the HTTP broadcast endpoint.
    Pusher,
}

/// Relay connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySettings {
    pub mode: RelayMode,
    /// Broadcast endpoint receiving `{source, token, bookmarks}` posts.
    pub broadcast_url: String,
    /// Endpoint returning `{key, cluster, appId}` when `key` is not set here.
    pub config_url: Option<String>,
    pub key: Option<String>,
    pub cluster: Option<String>,
    /// Overrides the websocket host derived from the cluster.
    pub ws_host: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            mode: RelayMode::Disabled,
            broadcast_url: "http://localhost:8888/.netlify/functions/sync-bookmarks".to_string(),
            config_url: None,
            key: None,
            cluster: None,
            ws_host: None,
        }
    }
}

/// Optional token-keyed bookmark persistence endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RemoteStoreSettings {
    /// Base URL, e.g. `http://localhost:5000`. `None` disables the remote store.
    pub base_url: Option<String>,
}

/// Retry policy for outbound publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub publish_timeout_secs: u64,
    pub retry_delay_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            publish_timeout_secs: 10,
            retry_delay_ms: 500,
        }
    }
}

/// Local persistence backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sqlite,
    Files,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Backends written on every change; the first one is read first.
    pub backends: Vec<BackendKind>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Sqlite],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter directive, overridden by `LINKSYNC_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
