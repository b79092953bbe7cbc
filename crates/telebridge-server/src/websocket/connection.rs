//! Per-viewer connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique viewer identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewerId(String);

impl ViewerId {
    /// Fresh time-ordered id.
    pub fn new() -> Self {
        Self(format!("viewer_{}", Uuid::now_v7()))
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of offering a snapshot to a viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task.
    Queued,
    /// Not newer than what the viewer already has.
    Stale,
    /// The queue was full or closed; counted as dropped.
    Dropped,
}

/// A subscribed viewer.
pub struct ViewerConnection {
    /// Unique id.
    pub id: ViewerId,
    tx: mpsc::Sender<Arc<String>>,
    /// Revision of the last snapshot queued. Held while sending so queue
    /// order follows revision order.
    last_revision: Mutex<Option<u64>>,
    /// When the viewer connected.
    pub connected_at: Instant,
    /// Whether a pong arrived since the last heartbeat check.
    pub is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl ViewerConnection {
    /// Create a connection that writes into `tx`.
    pub fn new(id: ViewerId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            last_revision: Mutex::new(None),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue an encoded snapshot unless the viewer already has `revision` or later.
    pub fn deliver(&self, revision: u64, message: Arc<String>) -> Delivery {
        let mut last = self.last_revision.lock();
        if last.is_some_and(|seen| seen >= revision) {
            return Delivery::Stale;
        }
        if self.tx.try_send(message).is_ok() {
            *last = Some(revision);
            Delivery::Queued
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            Delivery::Dropped
        }
    }

    /// Revision of the newest snapshot queued for this viewer.
    pub fn last_revision(&self) -> Option<u64> {
        *self.last_revision.lock()
    }

    /// Snapshots dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a pong.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Read and clear the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
