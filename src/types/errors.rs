use std::fmt;

// === ValidationError ===

/// Errors raised while normalizing user or peer input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The URL is missing or does not parse as an absolute URL.
    InvalidUrl(String),
    /// The `dateAdded` value is not an RFC 3339 timestamp.
    InvalidDate(String),
    /// The sync token is empty, too long, or contains unsupported characters.
    InvalidToken(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            ValidationError::InvalidDate(value) => write!(f, "Invalid date: {}", value),
            ValidationError::InvalidToken(token) => write!(f, "Invalid sync token: {}", token),
        }
    }
}

impl std::error::Error for ValidationError {}

// === StorageError ===

/// Errors related to the local key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing storage rejected the operation (quota, disabled, I/O).
    Unavailable(String),
    /// A stored value could not be decoded.
    Corrupt(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StorageError::Corrupt(msg) => write!(f, "Stored data is corrupt: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

// === SyncError ===

/// Errors related to relay subscription and snapshot publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The relay could not be reached or is not configured at join time.
    InitFailed(String),
    /// A publish attempt failed in a way worth retrying (network, timeout, 5xx).
    PublishTransient(String),
    /// Every publish attempt failed; the operation was dropped.
    FailedPermanently { attempts: u32, last_error: String },
    /// The operation belonged to a token that is no longer active.
    Superseded(String),
    /// No token is bound, so there is nowhere to publish.
    NotBound,
    /// Local persistence failed while applying sync state.
    Storage(StorageError),
    /// The token was rejected before any relay call.
    Validation(ValidationError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::InitFailed(msg) => write!(f, "Sync initialization failed: {}", msg),
            SyncError::PublishTransient(msg) => write!(f, "Sync publish failed: {}", msg),
            SyncError::FailedPermanently { attempts, last_error } => write!(
                f,
                "Sync failed permanently after {} attempts: {}",
                attempts, last_error
            ),
            SyncError::Superseded(token) => {
                write!(f, "Sync operation superseded by token switch: {}", token)
            }
            SyncError::NotBound => write!(f, "Sync is not bound to a token"),
            SyncError::Storage(e) => write!(f, "Sync storage error: {}", e),
            SyncError::Validation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Storage(e) => Some(e),
            SyncError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::Storage(e)
    }
}

impl From<ValidationError> for SyncError {
    fn from(e: ValidationError) -> Self {
        SyncError::Validation(e)
    }
}

// === BookmarkError ===

/// Errors related to bookmark management operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkError {
    /// The input failed validation; nothing was changed.
    Validation(ValidationError),
    /// The change could not be persisted.
    Storage(StorageError),
    /// No bookmark with the given URL exists.
    NotFound(String),
    /// A bookmark with the same URL already exists.
    DuplicateUrl(String),
    /// An import file could not be parsed.
    Import(String),
}

impl fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookmarkError::Validation(e) => write!(f, "{}", e),
            BookmarkError::Storage(e) => write!(f, "{}", e),
            BookmarkError::NotFound(url) => write!(f, "Bookmark not found: {}", url),
            BookmarkError::DuplicateUrl(url) => write!(f, "Duplicate bookmark URL: {}", url),
            BookmarkError::Import(msg) => write!(f, "Bookmark import failed: {}", msg),
        }
    }
}

impl std::error::Error for BookmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookmarkError::Validation(e) => Some(e),
            BookmarkError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for BookmarkError {
    fn from(e: ValidationError) -> Self {
        BookmarkError::Validation(e)
    }
}

impl From<StorageError> for BookmarkError {
    fn from(e: StorageError) -> Self {
        BookmarkError::Storage(e)
    }
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => write!(f, "Invalid settings value: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {}
