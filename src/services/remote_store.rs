//! Client for the optional token-keyed bookmark persistence endpoint.
//!
//! `GET <base>/api/urls?token=…` returns the group's records and
//! `POST <base>/api/urls` with `{token, urlData}` saves one. The endpoint is
//! a convenience for bootstrapping a new device; the relay stays the source
//! of live updates.

#[cfg(feature = "network")]
use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "network")]
use serde_json::json;
use serde_json::Value;
#[cfg(feature = "network")]
use tracing::debug;

use crate::types::bookmark::BookmarkRecord;
use crate::types::errors::SyncError;

/// Token-keyed bookmark persistence consulted on join.
#[async_trait]
pub trait RemoteBookmarkStore: Send + Sync {
    /// Records stored for `token`, as raw JSON values.
    async fn fetch(&self, token: &str) -> Result<Vec<Value>, SyncError>;

    /// Saves one record under `token`.
    async fn save(&self, token: &str, record: &BookmarkRecord) -> Result<(), SyncError>;
}

#[cfg(feature = "network")]
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the `/api/urls` endpoint.
#[cfg(feature = "network")]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "network")]
impl RemoteStore {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::InitFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/urls", self.base_url)
    }
}

#[cfg(feature = "network")]
#[async_trait]
impl RemoteBookmarkStore for RemoteStore {
    async fn fetch(&self, token: &str) -> Result<Vec<Value>, SyncError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| SyncError::InitFailed(format!("remote store unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(SyncError::InitFailed(format!(
                "remote store returned {}",
                response.status()
            )));
        }
        let records: Vec<Value> = response
            .json()
            .await
            .map_err(|e| SyncError::InitFailed(format!("invalid remote store response: {}", e)))?;
        debug!(token, count = records.len(), "fetched remote store records");
        Ok(records)
    }

    async fn save(&self, token: &str, record: &BookmarkRecord) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&json!({ "token": token, "urlData": record }))
            .send()
            .await
            .map_err(|e| SyncError::PublishTransient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::PublishTransient(format!(
                "remote store returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
