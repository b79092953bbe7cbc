//! Cloneable access to the device session for other tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use telebridge_core::DeviceError;
use tokio::sync::{mpsc, oneshot};

/// Public facts about the active device session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// Sequence number of the session, starting at 1 for the first device.
    pub id: u64,
    /// Remote address of the device.
    pub remote: SocketAddr,
    /// When the session was accepted.
    pub connected_at: DateTime<Utc>,
}

/// Bytes queued for the device task, with the channel for its write result.
#[derive(Debug)]
pub(crate) struct Outbound {
    /// Session the caller saw when queueing. Bytes are never written to a
    /// different session.
    pub(crate) session: u64,
    pub(crate) bytes: Bytes,
    pub(crate) reply: oneshot::Sender<Result<(), DeviceError>>,
}

/// Handle for sending bytes to the device.
///
/// The handle never touches the socket: bytes go through a queue drained by
/// the connection manager task, which is the only owner of the transport.
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    tx: mpsc::Sender<Outbound>,
    session: Arc<RwLock<Option<SessionInfo>>>,
}

impl DeviceHandle {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>, session: Arc<RwLock<Option<SessionInfo>>>) -> Self {
        Self { tx, session }
    }

    /// Write `bytes` to the active session.
    ///
    /// Fails with [`DeviceError::NotConnected`] when no session exists (or the
    /// manager is not running) and [`DeviceError::Transport`] when the write
    /// fails. A failed write leaves the session up; the read side tears it down.
    pub async fn send_to_device(&self, bytes: Bytes) -> Result<(), DeviceError> {
        let Some(info) = self.session_info() else {
            return Err(DeviceError::NotConnected);
        };
        self.send_for_session(info.id, bytes).await
    }

    /// Queue `bytes` for session `session`; any other session rejects them
    /// with [`DeviceError::NotConnected`].
    pub(crate) async fn send_for_session(&self, session: u64, bytes: Bytes) -> Result<(), DeviceError> {
        let (reply, result) = oneshot::channel();
        self.tx
            .send(Outbound {
                session,
                bytes,
                reply,
            })
            .await
            .map_err(|_| DeviceError::NotConnected)?;

        result.await.unwrap_or(Err(DeviceError::NotConnected))
    }

    /// Whether a device session is currently active.
    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    /// Details of the active session, if any.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.read().clone()
    }
}
