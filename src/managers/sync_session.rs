//! Sync Session for linksync.
//!
//! Owns the device's membership in a token group: the relay subscription for
//! `sync-channel-<token>`, the inbound consumer task that merges peer
//! snapshots into the local store, and the outbound path that hands full
//! snapshots to the [`SyncQueue`].
//!
//! State machine: `Unbound -> Joining -> Bound`. Switching tokens always
//! passes through `Unbound`: the old channel is unsubscribed, the consumer is
//! stopped and the queue epoch is advanced so in-flight publishes for the old
//! token are discarded. A relay that ends the inbound stream on its own also
//! drops the session to `Unbound`, so `resume` or `join` can rebind.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::services::local_store::LocalStore;
use crate::services::merge_engine::{merge, merge_raw, MergeReport};
use crate::services::normalizer::normalize_token;
use crate::services::relay::RelayClient;
use crate::services::remote_store::RemoteBookmarkStore;
use crate::services::sync_queue::{PublishOperation, QueuePolicy, QueueTicket, SyncQueue};
use crate::types::bookmark::BookmarkRecord;
use crate::types::errors::SyncError;
use crate::types::sync::{
    channel_for_token, ChangeOrigin, EventSender, Notice, SessionState, SyncEvent, SyncMessage, SyncStatus,
};

/// Random bytes behind a generated token (rendered as 32 hex chars).
const TOKEN_BYTES: usize = 16;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Merged; the report says whether anything changed.
    Applied(MergeReport),
    /// Our own publish echoed back by the relay.
    SelfEcho,
    /// Addressed to a token other than the bound one.
    ForeignToken,
    /// No token is bound.
    NotBound,
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinOutcome {
    pub token: String,
    /// The merged collection now stored as current and as the token snapshot.
    pub collection: Vec<BookmarkRecord>,
    /// The initial publish, when the merged collection was non-empty.
    pub publish: Option<QueueTicket>,
}

/// Session state shared with the consumer task.
#[derive(Clone)]
struct StateCell {
    state: Arc<Mutex<SessionState>>,
    events: EventSender,
}

impl StateCell {
    fn new(events: EventSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Unbound)),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self) -> SessionState {
        self.lock().clone()
    }

    fn set(&self, state: SessionState) {
        let mut current = self.lock();
        if *current != state {
            *current = state.clone();
            let _ = self.events.send(SyncEvent::StateChanged { state });
        }
    }

    /// `Bound { token }` becomes `Unbound`. Returns false when the session
    /// has already moved to another state or token.
    fn release(&self, token: &str) -> bool {
        let mut current = self.lock();
        if !matches!(&*current, SessionState::Bound { token: bound } if bound == token) {
            return false;
        }
        *current = SessionState::Unbound;
        let _ = self.events.send(SyncEvent::StateChanged {
            state: SessionState::Unbound,
        });
        true
    }
}

/// Everything the inbound path needs, detached from the session so the
/// consumer task can own a copy.
#[derive(Clone)]
struct InboundHandler {
    store: Arc<LocalStore>,
    device_id: String,
    token: String,
    events: EventSender,
}

impl InboundHandler {
    fn apply(&self, message: &SyncMessage) -> Result<InboundOutcome, SyncError> {
        if message.source == self.device_id {
            debug!(token = %self.token, "ignoring our own snapshot");
            return Ok(InboundOutcome::SelfEcho);
        }
        if message.token != self.token {
            debug!(token = %self.token, received = %message.token, "ignoring snapshot for another token");
            return Ok(InboundOutcome::ForeignToken);
        }

        let (report, count) = {
            let mut guard = self.store.lock()?;
            // A token switch may have landed between delivery and this merge.
            if guard.active_token()?.as_deref() != Some(self.token.as_str()) {
                return Ok(InboundOutcome::ForeignToken);
            }
            let current = guard.current_collection()?;
            let (merged, report) = merge_raw(&current, &message.bookmarks);
            if report.changed() {
                guard.commit_collection(Some(&self.token), &merged)?;
            }
            (report, merged.len())
        };

        if report.changed() {
            info!(
                token = %self.token,
                source = %message.source,
                added = report.added,
                replaced = report.replaced,
                "applied remote snapshot"
            );
            let _ = self.events.send(SyncEvent::CollectionChanged {
                origin: ChangeOrigin::Remote,
                count,
            });
        }
        Ok(InboundOutcome::Applied(report))
    }
}

/// Applies inbound snapshots until the relay ends the stream. Aborted by the
/// session on unbind, so reaching the end means the relay dropped us.
async fn consume(mut messages: mpsc::Receiver<SyncMessage>, handler: InboundHandler, state: StateCell) {
    while let Some(message) = messages.recv().await {
        if let Err(e) = handler.apply(&message) {
            error!(token = %handler.token, error = %e, "failed to apply remote snapshot");
            let _ = handler.events.send(SyncEvent::Notice(Notice::error(e.to_string())));
        }
    }
    if state.release(&handler.token) {
        warn!(token = %handler.token, "relay closed the sync channel");
        let _ = handler.events.send(SyncEvent::Notice(Notice::error(
            "Lost connection to the sync relay. Bookmarks are saved on this device only.",
        )));
    } else {
        debug!(token = %handler.token, "inbound consumer stopped");
    }
}

/// Generates a fresh token: 16 random bytes as lowercase hex.
pub fn generate_token() -> Result<String, SyncError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| SyncError::InitFailed("system random source unavailable".to_string()))?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// The device's sync membership. All dependencies come in through the constructor.
pub struct SyncSession {
    store: Arc<LocalStore>,
    relay: Arc<dyn RelayClient>,
    remote_store: Option<Arc<dyn RemoteBookmarkStore>>,
    queue: SyncQueue,
    events: EventSender,
    device_id: String,
    state: StateCell,
    consumer: Option<JoinHandle<()>>,
}

impl SyncSession {
    /// Creates an unbound session. Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<LocalStore>,
        relay: Arc<dyn RelayClient>,
        policy: QueuePolicy,
        events: EventSender,
    ) -> Result<Self, SyncError> {
        let device_id = store.device_id()?;
        let queue = SyncQueue::spawn(policy, events.clone());
        Ok(Self {
            store,
            relay,
            remote_store: None,
            queue,
            state: StateCell::new(events.clone()),
            events,
            device_id,
            consumer: None,
        })
    }

    /// Consults `remote_store` on every join.
    pub fn with_remote_store(mut self, remote_store: Arc<dyn RemoteBookmarkStore>) -> Self {
        self.remote_store = Some(remote_store);
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The bound token, if any.
    pub fn bound_token(&self) -> Option<String> {
        match self.state.get() {
            SessionState::Bound { token } => Some(token),
            _ => None,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.set(state);
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(SyncEvent::Notice(notice));
    }

    /// Leaves the current channel, if any, without touching the persisted token.
    async fn unbind(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
        let token = match self.state.get() {
            SessionState::Bound { token } | SessionState::Joining { token } => token,
            SessionState::Unbound => return,
        };
        // Unbound first, so a consumer seeing its stream close stays quiet.
        self.set_state(SessionState::Unbound);
        self.relay.unsubscribe(&channel_for_token(&token)).await;
        self.queue.advance_epoch();
        info!(%token, "left sync channel");
    }

    /// Joins the group named by `token`.
    ///
    /// The token is persisted as active before the relay is contacted, so a
    /// failed join can be retried with [`resume`](Self::resume). On success
    /// the token's last snapshot (and the remote store, when configured) are
    /// merged into the current collection, both keys are committed and the
    /// merged collection is published if non-empty.
    pub async fn join(&mut self, token: &str) -> Result<JoinOutcome, SyncError> {
        let token = normalize_token(token)?;
        self.unbind().await;
        self.store.set_active_token(&token)?;
        self.set_state(SessionState::Joining { token: token.clone() });

        let channel = channel_for_token(&token);
        let subscription = match self.relay.subscribe(&channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(%token, error = %e, "sync join failed");
                self.set_state(SessionState::Unbound);
                self.notify(Notice::error(format!("{}. Bookmarks are saved on this device only.", e)));
                return Err(e);
            }
        };

        let remote_values = self.fetch_remote_records(&token).await;
        let collection = match self.merge_on_join(&token, &remote_values) {
            Ok(collection) => collection,
            Err(e) => {
                error!(%token, error = %e, "could not store merged collection on join");
                self.relay.unsubscribe(&channel).await;
                self.set_state(SessionState::Unbound);
                return Err(e);
            }
        };

        let handler = InboundHandler {
            store: self.store.clone(),
            device_id: self.device_id.clone(),
            token: token.clone(),
            events: self.events.clone(),
        };
        // Bound before the consumer starts, so a stream that is already closed
        // is seen as a lost binding rather than a stale one.
        self.set_state(SessionState::Bound { token: token.clone() });
        self.consumer = Some(tokio::spawn(consume(subscription.messages, handler, self.state.clone())));
        info!(%token, %channel, count = collection.len(), "joined sync channel");

        let _ = self.events.send(SyncEvent::CollectionChanged {
            origin: ChangeOrigin::Join,
            count: collection.len(),
        });

        let publish = if collection.is_empty() {
            None
        } else {
            Some(self.publish(&collection)?)
        };

        Ok(JoinOutcome {
            token,
            collection,
            publish,
        })
    }

    async fn fetch_remote_records(&self, token: &str) -> Vec<serde_json::Value> {
        let Some(remote_store) = &self.remote_store else {
            return Vec::new();
        };
        match remote_store.fetch(token).await {
            Ok(values) => values,
            Err(e) => {
                warn!(%token, error = %e, "remote bookmark store unavailable");
                self.notify(Notice::warning("Remote bookmark store unavailable; using local data only."));
                Vec::new()
            }
        }
    }

    fn merge_on_join(&self, token: &str, remote_values: &[serde_json::Value]) -> Result<Vec<BookmarkRecord>, SyncError> {
        let mut guard = self.store.lock()?;
        let current = guard.current_collection()?;
        let snapshot = guard.token_snapshot(token)?.unwrap_or_default();
        let with_snapshot = merge(&current, &snapshot);
        let (merged, report) = merge_raw(&with_snapshot, remote_values);
        guard.commit_collection(Some(token), &merged)?;
        debug!(%token, snapshot = snapshot.len(), remote = remote_values.len(), dropped = report.dropped, "merged on join");
        Ok(merged)
    }

    /// Creates a fresh random token and joins it.
    pub async fn generate(&mut self) -> Result<JoinOutcome, SyncError> {
        let token = generate_token()?;
        info!(%token, "generated sync token");
        self.join(&token).await
    }

    /// Leaves the group and forgets the active token. Local bookmarks stay.
    pub async fn leave(&mut self) -> Result<(), SyncError> {
        self.unbind().await;
        self.store.clear_active_token()?;
        Ok(())
    }

    /// Rejoins the persisted active token, if any. Relay failures are reported
    /// as notices and leave the session unbound; only storage errors surface.
    pub async fn resume(&mut self) -> Result<Option<JoinOutcome>, SyncError> {
        let Some(token) = self.store.active_token()? else {
            return Ok(None);
        };
        match self.join(&token).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(SyncError::Storage(e)) => Err(SyncError::Storage(e)),
            Err(e) => {
                debug!(%token, error = %e, "resume left the session unbound");
                Ok(None)
            }
        }
    }

    /// Applies one inbound snapshot. The consumer task calls the same logic.
    pub fn on_remote_update(&self, message: &SyncMessage) -> Result<InboundOutcome, SyncError> {
        let Some(token) = self.bound_token() else {
            return Ok(InboundOutcome::NotBound);
        };
        InboundHandler {
            store: self.store.clone(),
            device_id: self.device_id.clone(),
            token,
            events: self.events.clone(),
        }
        .apply(message)
    }

    /// Bumps the token's version and enqueues a full snapshot for publishing.
    /// Returns immediately; the ticket resolves when the queue is done with it.
    pub fn publish(&self, collection: &[BookmarkRecord]) -> Result<QueueTicket, SyncError> {
        let token = self.bound_token().ok_or(SyncError::NotBound)?;
        let version = self.store.bump_version(&token)?;
        let message = Arc::new(SyncMessage::snapshot(&self.device_id, &token, collection, version));
        debug!(%token, version, count = collection.len(), "queueing snapshot");

        let relay = self.relay.clone();
        let operation: PublishOperation = Arc::new(move || {
            let relay = relay.clone();
            let message = message.clone();
            async move { relay.publish(&message).await }.boxed()
        });
        Ok(self.queue.enqueue(&token, operation))
    }

    /// Saves one record to the remote bookmark store in the background.
    /// Failures are logged; the relay snapshot already carries the record.
    pub fn save_to_remote_store(&self, record: &BookmarkRecord) {
        let (Some(remote_store), Some(token)) = (self.remote_store.clone(), self.bound_token()) else {
            return;
        };
        let record = record.clone();
        tokio::spawn(async move {
            if let Err(e) = remote_store.save(&token, &record).await {
                warn!(%token, url = %record.url, error = %e, "remote store save failed");
            }
        });
    }

    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        let active_token = self.store.active_token()?;
        let version = match &active_token {
            Some(token) => self.store.version(token)?,
            None => 0,
        };
        Ok(SyncStatus {
            state: self.state.get(),
            active_token,
            device_id: self.device_id.clone(),
            version,
        })
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
    }
}
