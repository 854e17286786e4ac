use shared::{
    domain::{ChannelId, ServerId, UserId},
    error::ApiResult,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::debug;

const CHANGE_FEED_CAPACITY: usize = 256;

/// A write that may invalidate live-query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Messages { channel_id: ChannelId },
    Server { server_id: ServerId },
    Channels { server_id: ServerId },
    Members { server_id: ServerId, user_id: UserId },
    Invites { server_id: ServerId },
    Profile { user_id: UserId },
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, change: Change) {
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Ownership of one live-query listener.
///
/// Releasing is synchronous: once `release` returns (or the handle is
/// dropped) the producer is aborted and every release hook has run.
pub struct SubscriptionHandle {
    label: String,
    producer: Option<JoinHandle<()>>,
    release_hooks: Vec<ReleaseHook>,
    released: bool,
}

impl SubscriptionHandle {
    pub fn new(label: impl Into<String>, producer: Option<JoinHandle<()>>) -> Self {
        Self {
            label: label.into(),
            producer,
            release_hooks: Vec::new(),
            released: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        !self.released
    }

    pub fn on_release(&mut self, hook: impl FnOnce() + Send + 'static) {
        if self.released {
            hook();
        } else {
            self.release_hooks.push(Box::new(hook));
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        for hook in self.release_hooks.drain(..) {
            hook();
        }
        debug!(label = %self.label, "live query released");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Receiving half of a live query: full result-set snapshots in delivery order.
pub struct SnapshotStream<T> {
    snapshots: mpsc::Receiver<ApiResult<T>>,
}

impl<T> SnapshotStream<T> {
    pub async fn next(&mut self) -> Option<ApiResult<T>> {
        self.snapshots.recv().await
    }
}

pub struct LiveQuery<T> {
    handle: SubscriptionHandle,
    stream: SnapshotStream<T>,
}

impl<T> LiveQuery<T> {
    pub fn new(handle: SubscriptionHandle, snapshots: mpsc::Receiver<ApiResult<T>>) -> Self {
        Self {
            handle,
            stream: SnapshotStream { snapshots },
        }
    }

    /// A query fed by hand through the returned sender; it has no producer task.
    pub fn channel(label: impl Into<String>, capacity: usize) -> (mpsc::Sender<ApiResult<T>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(SubscriptionHandle::new(label, None), rx))
    }

    /// A query that never delivers a snapshot.
    pub fn idle(label: impl Into<String>) -> Self {
        let (_, query) = Self::channel(label, 1);
        query
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }

    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.handle.on_release(hook);
        self
    }

    pub async fn next(&mut self) -> Option<ApiResult<T>> {
        self.stream.next().await
    }

    pub fn split(self) -> (SubscriptionHandle, SnapshotStream<T>) {
        (self.handle, self.stream)
    }
}
