//! Snapshot fan-out to connected viewers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use telebridge_core::{Snapshot, SnapshotPublisher, TelemetryStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::{Delivery, ViewerConnection, ViewerId};

/// Event name viewers listen for.
pub const UPDATE_EVENT: &str = "update_data";

#[derive(Serialize)]
struct SnapshotEvent<'a> {
    event: &'static str,
    data: &'a Snapshot,
}

/// Encode a snapshot as the `update_data` envelope.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SnapshotEvent {
        event: UPDATE_EVENT,
        data: snapshot,
    })
}

/// Registry of viewer subscriptions.
///
/// Publishing never blocks: each viewer has its own bounded queue, and a full
/// queue only affects that viewer.
pub struct BroadcastHub {
    viewers: RwLock<HashMap<ViewerId, Arc<ViewerConnection>>>,
    store: Arc<TelemetryStore>,
    max_send_queue: usize,
}

impl BroadcastHub {
    /// Create a hub whose new subscribers start from `store`'s current snapshot.
    pub fn new(store: Arc<TelemetryStore>, max_send_queue: usize) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            store,
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a viewer and queue the current snapshot for it.
    ///
    /// The viewer is registered before the snapshot is read, so a concurrent
    /// publish is either seen here or delivered afterwards; the revision
    /// check drops whichever copy arrives second.
    pub fn subscribe(&self) -> (Arc<ViewerConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(ViewerConnection::new(ViewerId::new(), tx));
        let _ = self
            .viewers
            .write()
            .insert(conn.id.clone(), Arc::clone(&conn));

        let snapshot = self.store.current_snapshot();
        match encode_snapshot(&snapshot) {
            Ok(json) => {
                let _ = conn.deliver(snapshot.revision(), Arc::new(json));
            }
            Err(e) => warn!(error = %e, "failed to serialize snapshot"),
        }
        debug!(viewer_id = %conn.id, revision = snapshot.revision(), "viewer subscribed");
        (conn, rx)
    }

    /// Remove a viewer. Later publishes skip it.
    pub fn unsubscribe(&self, id: &ViewerId) -> bool {
        self.viewers.write().remove(id).is_some()
    }

    /// Number of subscribed viewers.
    pub fn viewer_count(&self) -> usize {
        self.viewers.read().len()
    }

    /// Snapshots dropped for `id` so far, if it is still subscribed.
    pub fn drop_count(&self, id: &ViewerId) -> Option<u64> {
        self.viewers.read().get(id).map(|c| c.drop_count())
    }
}

impl SnapshotPublisher for BroadcastHub {
    fn publish(&self, snapshot: &Snapshot) {
        let json = match encode_snapshot(snapshot) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(revision = snapshot.revision(), error = %e, "failed to serialize snapshot");
                return;
            }
        };

        let viewers = self.viewers.read();
        debug!(
            revision = snapshot.revision(),
            status = snapshot.status().kind(),
            recipients = viewers.len(),
            "publish snapshot"
        );
        for conn in viewers.values() {
            if conn.deliver(snapshot.revision(), Arc::clone(&json)) == Delivery::Dropped {
                warn!(
                    viewer_id = %conn.id,
                    dropped = conn.drop_count(),
                    "viewer queue full, dropping snapshot"
                );
            }
        }
    }
}
