//! Sync Queue for linksync.
//!
//! Serializes outbound publish operations on one worker task. Operations run
//! strictly in enqueue order; a failed attempt is re-queued at the front so
//! later operations never overtake it. Every operation carries the epoch that
//! was current when it was enqueued, and a token switch advances the epoch so
//! stale work is discarded instead of published to the new channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::types::errors::SyncError;
use crate::types::settings::QueueSettings;
use crate::types::sync::{EventSender, Notice, SyncEvent};

/// One publish attempt. Called again for every retry.
pub type PublishOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync>;

/// Retry and timeout policy applied to every queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

impl From<&QueueSettings> for QueuePolicy {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(settings.publish_timeout_secs),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

struct QueuedOperation {
    id: u64,
    token: String,
    epoch: u64,
    attempts: u32,
    run: PublishOperation,
    done: oneshot::Sender<Result<(), SyncError>>,
}

/// Handle to the final outcome of an enqueued operation.
#[derive(Debug)]
pub struct QueueTicket {
    pub id: u64,
    outcome: oneshot::Receiver<Result<(), SyncError>>,
}

impl QueueTicket {
    /// Waits until the operation succeeded, failed permanently, or was superseded.
    pub async fn outcome(self) -> Result<(), SyncError> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => Err(SyncError::PublishTransient("sync queue stopped".to_string())),
        }
    }
}

/// FIFO publish queue backed by a single worker task.
pub struct SyncQueue {
    sender: mpsc::UnboundedSender<QueuedOperation>,
    epoch: Arc<AtomicU64>,
    next_id: AtomicU64,
    policy: QueuePolicy,
    worker: JoinHandle<()>,
}

impl SyncQueue {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn spawn(policy: QueuePolicy, events: EventSender) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run_worker(receiver, policy, epoch.clone(), events));
        Self {
            sender,
            epoch,
            next_id: AtomicU64::new(1),
            policy,
            worker,
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Fences every operation enqueued so far. Returns the new epoch.
    pub fn advance_epoch(&self) -> u64 {
        let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch = next, "sync queue epoch advanced");
        next
    }

    /// Appends an operation for `token` to the back of the queue.
    pub fn enqueue(&self, token: &str, run: PublishOperation) -> QueueTicket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (done, outcome) = oneshot::channel();
        let op = QueuedOperation {
            id,
            token: token.to_string(),
            epoch: self.current_epoch(),
            attempts: 0,
            run,
            done,
        };
        if self.sender.send(op).is_err() {
            // The receiver side of `done` observes the drop and reports a stopped queue.
            error!(token, "sync queue worker is gone; operation dropped");
        }
        QueueTicket { id, outcome }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedOperation>,
    policy: QueuePolicy,
    epoch: Arc<AtomicU64>,
    events: EventSender,
) {
    let mut pending: VecDeque<QueuedOperation> = VecDeque::new();

    loop {
        while let Ok(op) = receiver.try_recv() {
            pending.push_back(op);
        }
        let mut op = match pending.pop_front() {
            Some(op) => op,
            None => match receiver.recv().await {
                Some(op) => op,
                None => break,
            },
        };

        if op.epoch != epoch.load(Ordering::SeqCst) {
            debug!(id = op.id, token = %op.token, "discarding operation from a previous token");
            let _ = op.done.send(Err(SyncError::Superseded(op.token)));
            continue;
        }

        op.attempts += 1;
        let attempt = op.attempts;
        let result = match tokio::time::timeout(policy.attempt_timeout, (op.run)()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::PublishTransient(format!(
                "timed out after {}s",
                policy.attempt_timeout.as_secs()
            ))),
        };

        match result {
            Ok(()) => {
                if attempt > 1 {
                    info!(id = op.id, token = %op.token, attempt, "sync publish succeeded after retry");
                    notify(&events, Notice::info(format!("Sync recovered after {} attempts", attempt)));
                } else {
                    debug!(id = op.id, token = %op.token, "sync publish succeeded");
                }
                let _ = op.done.send(Ok(()));
            }
            Err(err) if attempt >= policy.max_attempts => {
                error!(id = op.id, token = %op.token, attempt, error = %err, "sync publish failed permanently");
                let failure = SyncError::FailedPermanently {
                    attempts: attempt,
                    last_error: err.to_string(),
                };
                notify(&events, Notice::error(failure.to_string()));
                let _ = op.done.send(Err(failure));
            }
            Err(err) => {
                warn!(id = op.id, token = %op.token, attempt, error = %err, "sync publish failed, retrying");
                if attempt == 1 {
                    notify(&events, Notice::warning(format!("Sync failed, retrying: {}", err)));
                }
                if !policy.retry_delay.is_zero() {
                    tokio::time::sleep(policy.retry_delay).await;
                }
                pending.push_front(op);
            }
        }
    }

    debug!("sync queue worker stopped");
}

fn notify(events: &EventSender, notice: Notice) {
    // A closed event stream only means nobody is listening.
    let _ = events.send(SyncEvent::Notice(notice));
}
