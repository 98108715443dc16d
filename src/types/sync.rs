use serde::{Deserialize, Serialize};

use super::bookmark::BookmarkRecord;

/// Relay event name carrying collection snapshots.
pub const SYNC_EVENT_NAME: &str = "sync-update";

/// Prefix of every token-scoped relay channel.
pub const CHANNEL_PREFIX: &str = "sync-channel-";

/// Returns the relay channel name for a sync token.
pub fn channel_for_token(token: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, token)
}

/// A full-collection snapshot exchanged between devices sharing a token.
///
/// `bookmarks` stays as raw JSON so that one malformed entry from a peer
/// only drops that entry, not the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub source: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub bookmarks: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub version: u64,
}

impl SyncMessage {
    /// Builds an outbound snapshot message.
    pub fn snapshot(source: &str, token: &str, bookmarks: &[BookmarkRecord], version: u64) -> Self {
        Self {
            source: source.to_string(),
            token: token.to_string(),
            bookmarks: bookmarks
                .iter()
                .filter_map(|b| serde_json::to_value(b).ok())
                .collect(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            version,
        }
    }
}

/// Membership state of a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Unbound,
    Joining { token: String },
    Bound { token: String },
}

/// Summary reported by `sync.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub state: SessionState,
    pub active_token: Option<String>,
    pub device_id: String,
    pub version: u64,
}

/// Where a collection change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Local,
    Remote,
    Join,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A single human-readable message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Events pushed to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    CollectionChanged { origin: ChangeOrigin, count: usize },
    StateChanged { state: SessionState },
    Notice(Notice),
}

/// Outbound side of the UI event stream.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<SyncEvent>;
