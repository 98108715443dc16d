//! Pub/sub relay seam.
//!
//! The sync session only talks to a [`RelayClient`]: subscribe to a channel,
//! unsubscribe from it, publish a snapshot. [`MemoryRelay`] is an in-process
//! hub (single-host mode and tests), [`DisabledRelay`] stands in when sync is
//! not configured, and the Pusher client lives in `pusher_relay`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::errors::SyncError;
use crate::types::sync::{channel_for_token, SyncMessage};

/// Capacity of the per-subscription inbound buffer.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Inbound side of a channel subscription.
pub struct RelaySubscription {
    pub channel: String,
    pub messages: mpsc::Receiver<SyncMessage>,
}

/// Transport to the external pub/sub relay.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Subscribes to `channel`. Fails with `SyncError::InitFailed` when unreachable.
    async fn subscribe(&self, channel: &str) -> Result<RelaySubscription, SyncError>;

    /// Drops the subscription to `channel`; a no-op if not subscribed.
    async fn unsubscribe(&self, channel: &str);

    /// Broadcasts a snapshot on the message's token channel.
    async fn publish(&self, message: &SyncMessage) -> Result<(), SyncError>;
}

// === DisabledRelay ===

/// Relay used when sync is not configured. Every call fails; local CRUD is unaffected.
pub struct DisabledRelay {
    reason: String,
}

impl DisabledRelay {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl RelayClient for DisabledRelay {
    async fn subscribe(&self, _channel: &str) -> Result<RelaySubscription, SyncError> {
        Err(SyncError::InitFailed(self.reason.clone()))
    }

    async fn unsubscribe(&self, _channel: &str) {}

    async fn publish(&self, _message: &SyncMessage) -> Result<(), SyncError> {
        Err(SyncError::PublishTransient(self.reason.clone()))
    }
}

// === MemoryRelay ===

#[derive(Default)]
struct HubState {
    /// Per channel: the owning client and its inbound sender.
    subscribers: HashMap<String, Vec<(u64, mpsc::Sender<SyncMessage>)>>,
    published: Vec<SyncMessage>,
    reachable: bool,
    failing_publishes: u32,
    next_client: u64,
}

/// In-process relay hub.
///
/// Every clone is a separate client of the same hub, so two sessions built
/// from clones of one `MemoryRelay` behave like two devices on one relay:
/// they see each other's publishes, and unsubscribing one leaves the other
/// subscribed.
pub struct MemoryRelay {
    hub: Arc<Mutex<HubState>>,
    client: u64,
}

impl Clone for MemoryRelay {
    fn clone(&self) -> Self {
        let client = {
            let mut hub = self.hub();
            hub.next_client += 1;
            hub.next_client
        };
        Self {
            hub: self.hub.clone(),
            client,
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(HubState {
                reachable: true,
                ..HubState::default()
            })),
            client: 0,
        }
    }

    fn hub(&self) -> std::sync::MutexGuard<'_, HubState> {
        // A poisoned hub only means a panicking test thread; keep serving.
        self.hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates the relay going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.hub().reachable = reachable;
    }

    /// Makes the next `count` publishes fail with a transient error.
    pub fn fail_next_publishes(&self, count: u32) {
        self.hub().failing_publishes = count;
    }

    /// Every message accepted so far, in arrival order.
    pub fn published(&self) -> Vec<SyncMessage> {
        self.hub().published.clone()
    }

    /// Number of live subscriptions to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.hub()
            .subscribers
            .get(channel)
            .map(|subs| subs.iter().filter(|(_, s)| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Delivers a message to subscribers as if another device had published it.
    pub async fn inject(&self, message: SyncMessage) {
        let channel = channel_for_token(&message.token);
        let senders = self.subscribers_for(&channel);
        deliver(senders, &channel, &message).await;
    }

    /// Live senders for `channel`, pruning closed ones.
    fn subscribers_for(&self, channel: &str) -> Vec<mpsc::Sender<SyncMessage>> {
        let mut hub = self.hub();
        match hub.subscribers.get_mut(channel) {
            Some(subs) => {
                subs.retain(|(_, s)| !s.is_closed());
                subs.iter().map(|(_, s)| s.clone()).collect()
            }
            None => Vec::new(),
        }
    }
}

/// Sends to each subscriber in turn. A full buffer applies backpressure to
/// the publisher rather than losing the snapshot.
async fn deliver(senders: Vec<mpsc::Sender<SyncMessage>>, channel: &str, message: &SyncMessage) {
    for sender in senders {
        if sender.capacity() == 0 {
            debug!(channel, "subscriber buffer full, waiting");
        }
        if sender.send(message.clone()).await.is_err() {
            warn!(channel, "subscriber went away before delivery");
        }
    }
}

#[async_trait]
impl RelayClient for MemoryRelay {
    async fn subscribe(&self, channel: &str) -> Result<RelaySubscription, SyncError> {
        let mut hub = self.hub();
        if !hub.reachable {
            return Err(SyncError::InitFailed("relay unreachable".to_string()));
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        hub.subscribers
            .entry(channel.to_string())
            .or_default()
            .push((self.client, tx));
        Ok(RelaySubscription {
            channel: channel.to_string(),
            messages: rx,
        })
    }

    async fn unsubscribe(&self, channel: &str) {
        let client = self.client;
        let mut hub = self.hub();
        if let Some(subs) = hub.subscribers.get_mut(channel) {
            subs.retain(|(owner, s)| *owner != client && !s.is_closed());
            if subs.is_empty() {
                hub.subscribers.remove(channel);
            }
        }
    }

    async fn publish(&self, message: &SyncMessage) -> Result<(), SyncError> {
        {
            let mut hub = self.hub();
            if !hub.reachable {
                return Err(SyncError::PublishTransient("relay unreachable".to_string()));
            }
            if hub.failing_publishes > 0 {
                hub.failing_publishes -= 1;
                return Err(SyncError::PublishTransient("relay returned 503".to_string()));
            }
            hub.published.push(message.clone());
        }
        let channel = channel_for_token(&message.token);
        let senders = self.subscribers_for(&channel);
        deliver(senders, &channel, message).await;
        Ok(())
    }
}
