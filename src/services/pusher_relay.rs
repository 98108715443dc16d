//! Pusher relay client.
//!
//! Inbound: a websocket speaking Pusher protocol 7, one connection per
//! subscribed channel, with a reader task forwarding `sync-update` events.
//! Outbound: an HTTP POST to the broadcast endpoint, which triggers the event
//! server-side (clients cannot publish on public channels).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::services::relay::{RelayClient, RelaySubscription, SUBSCRIPTION_BUFFER};
use crate::types::errors::SyncError;
use crate::types::settings::RelaySettings;
use crate::types::sync::{SyncMessage, CHANNEL_PREFIX, SYNC_EVENT_NAME};

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "linksync";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Public relay credentials, as returned by the config endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PusherConfig {
    pub key: String,
    pub cluster: String,
    #[serde(rename = "appId", default)]
    pub app_id: Option<String>,
}

impl PusherConfig {
    /// Loads `{key, cluster, appId}` from the relay config endpoint.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, SyncError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::InitFailed(format!("relay config request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(SyncError::InitFailed(format!(
                "relay config endpoint returned {}",
                response.status()
            )));
        }
        response
            .json::<PusherConfig>()
            .await
            .map_err(|e| SyncError::InitFailed(format!("invalid relay config: {}", e)))
    }
}

/// Websocket URL for an app key. `ws_host` overrides the cluster host.
pub fn socket_url(key: &str, cluster: &str, ws_host: Option<&str>) -> String {
    let host = match ws_host {
        Some(host) => host.trim_end_matches('/').to_string(),
        None => format!("wss://ws-{}.pusher.com:443", cluster),
    };
    format!(
        "{}/app/{}?protocol={}&client={}&version={}&flash=false",
        host,
        key,
        PROTOCOL_VERSION,
        CLIENT_NAME,
        env!("CARGO_PKG_VERSION")
    )
}

// === Frames ===

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ConnectionEstablished { socket_id: String },
    SubscriptionSucceeded { channel: String },
    Ping,
    Sync { channel: String, message: SyncMessage },
    Error { code: Option<i64>, message: String },
    Other { event: String },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct ConnectionData {
    socket_id: String,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// Event `data` is usually a JSON-encoded string, but some servers send an object.
fn decode_data<T: DeserializeOwned>(data: Option<Value>) -> Result<T, String> {
    match data {
        Some(Value::String(encoded)) => serde_json::from_str(&encoded).map_err(|e| e.to_string()),
        Some(value) => serde_json::from_value(value).map_err(|e| e.to_string()),
        None => Err("missing data".to_string()),
    }
}

/// Parses one text frame from the socket.
pub fn parse_frame(text: &str) -> Result<Frame, SyncError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| SyncError::PublishTransient(format!("malformed relay frame: {}", e)))?;
    let bad = |e: String| SyncError::PublishTransient(format!("malformed {} frame: {}", raw.event, e));

    let frame = match raw.event.as_str() {
        "pusher:connection_established" => {
            let data: ConnectionData = decode_data(raw.data.clone()).map_err(bad)?;
            Frame::ConnectionEstablished { socket_id: data.socket_id }
        }
        "pusher_internal:subscription_succeeded" => Frame::SubscriptionSucceeded {
            channel: raw.channel.clone().unwrap_or_default(),
        },
        "pusher:ping" => Frame::Ping,
        "pusher:error" => {
            let data: ErrorData = decode_data(raw.data.clone()).map_err(bad)?;
            Frame::Error { code: data.code, message: data.message }
        }
        SYNC_EVENT_NAME => {
            let channel = raw.channel.clone().unwrap_or_default();
            let mut message: SyncMessage = decode_data(raw.data.clone()).map_err(bad)?;
            // The broadcast endpoint drops the token; the channel name carries it.
            if message.token.is_empty() {
                if let Some(token) = channel.strip_prefix(CHANNEL_PREFIX) {
                    message.token = token.to_string();
                }
            }
            Frame::Sync { channel, message }
        }
        other => Frame::Other { event: other.to_string() },
    };
    Ok(frame)
}

pub fn subscribe_frame(channel: &str) -> String {
    json!({"event": "pusher:subscribe", "data": {"channel": channel}}).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    json!({"event": "pusher:unsubscribe", "data": {"channel": channel}}).to_string()
}

pub fn pong_frame() -> String {
    json!({"event": "pusher:pong", "data": {}}).to_string()
}

// === Client ===

/// Relay client for a Pusher app plus its broadcast endpoint.
pub struct PusherRelay {
    http: reqwest::Client,
    settings: RelaySettings,
    connections: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl PusherRelay {
    pub fn new(settings: RelaySettings) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SyncError::InitFailed(e.to_string()))?;
        Ok(Self {
            http,
            settings,
            connections: Mutex::new(HashMap::new()),
        })
    }

    async fn resolve_socket_url(&self) -> Result<String, SyncError> {
        let ws_host = self.settings.ws_host.as_deref();
        if let (Some(key), Some(cluster)) = (&self.settings.key, &self.settings.cluster) {
            return Ok(socket_url(key, cluster, ws_host));
        }
        match &self.settings.config_url {
            Some(url) => {
                let config = PusherConfig::fetch(&self.http, url).await?;
                Ok(socket_url(&config.key, &config.cluster, ws_host))
            }
            None => Err(SyncError::InitFailed("relay key and cluster are not configured".to_string())),
        }
    }
}

#[async_trait]
impl RelayClient for PusherRelay {
    async fn subscribe(&self, channel: &str) -> Result<RelaySubscription, SyncError> {
        let url = self.resolve_socket_url().await?;
        let (socket, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| SyncError::InitFailed("relay connection timed out".to_string()))?
            .map_err(|e| SyncError::InitFailed(format!("relay connection failed: {}", e)))?;
        let (mut write, mut read) = socket.split();

        let handshake = async {
            let mut subscribed = false;
            while let Some(incoming) = read.next().await {
                let text = match incoming {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => return Err(SyncError::InitFailed(e.to_string())),
                };
                match parse_frame(&text) {
                    Ok(Frame::ConnectionEstablished { socket_id }) => {
                        debug!(%socket_id, channel, "relay connection established");
                        write
                            .send(Message::Text(subscribe_frame(channel)))
                            .await
                            .map_err(|e| SyncError::InitFailed(e.to_string()))?;
                    }
                    Ok(Frame::SubscriptionSucceeded { channel: c }) if c == channel => {
                        subscribed = true;
                        break;
                    }
                    Ok(Frame::Ping) => {
                        write
                            .send(Message::Text(pong_frame()))
                            .await
                            .map_err(|e| SyncError::InitFailed(e.to_string()))?;
                    }
                    Ok(Frame::Error { code, message }) => {
                        return Err(SyncError::InitFailed(format!("relay error {:?}: {}", code, message)));
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "ignoring relay frame during handshake"),
                }
            }
            if subscribed {
                Ok(())
            } else {
                Err(SyncError::InitFailed("relay closed the connection".to_string()))
            }
        };
        timeout(HANDSHAKE_TIMEOUT, handshake)
            .await
            .map_err(|_| SyncError::InitFailed("relay subscription timed out".to_string()))??;

        info!(channel, "subscribed to relay channel");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let reader_channel = channel.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(Message::Text(unsubscribe_frame(&reader_channel))).await;
                        let _ = write.close().await;
                        break;
                    }
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            Ok(Frame::Sync { channel, message }) if channel == reader_channel => {
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Frame::Ping) => {
                                if write.send(Message::Text(pong_frame())).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Frame::Error { code, message }) => {
                                warn!(channel = %reader_channel, ?code, %message, "relay reported an error");
                            }
                            Ok(_) => {}
                            Err(e) => debug!(channel = %reader_channel, error = %e, "dropping relay frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            warn!(channel = %reader_channel, "relay connection closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(channel = %reader_channel, error = %e, "relay connection failed");
                            break;
                        }
                    }
                }
            }
        });

        self.connections.lock().await.insert(channel.to_string(), shutdown_tx);
        Ok(RelaySubscription {
            channel: channel.to_string(),
            messages: rx,
        })
    }

    async fn unsubscribe(&self, channel: &str) {
        if let Some(shutdown) = self.connections.lock().await.remove(channel) {
            let _ = shutdown.send(());
            info!(channel, "unsubscribed from relay channel");
        }
    }

    async fn publish(&self, message: &SyncMessage) -> Result<(), SyncError> {
        let response = self
            .http
            .post(&self.settings.broadcast_url)
            .json(message)
            .send()
            .await
            .map_err(|e| SyncError::PublishTransient(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::PublishTransient(e.to_string()))?;
        let parsed: Result<Value, _> = serde_json::from_str(&body);

        if !status.is_success() {
            let reason = parsed
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "no error message".to_string());
            return Err(SyncError::PublishTransient(format!("broadcast returned {}: {}", status, reason)));
        }
        parsed.map_err(|e| SyncError::PublishTransient(format!("malformed broadcast response: {}", e)))?;
        Ok(())
    }
}
