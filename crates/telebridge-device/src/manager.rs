//! Device listener and session loop.
//!
//! One task owns the listener, the active stream, and the frame decoder.
//! Outbound commands arrive on a queue and are written between reads, so the
//! socket never has a second owner.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use telebridge_core::{DeviceError, DeviceStatus, FrameDecoder, Snapshot, SnapshotPublisher, TelemetryStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::errors::BindFailure;
use crate::handle::{DeviceHandle, Outbound, SessionInfo};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Why a device session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The device closed its side of the connection.
    PeerClosed,
    /// No bytes arrived within the configured read timeout.
    Idle(Duration),
    /// Reading from the transport failed.
    Transport(String),
    /// The process is shutting down.
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Idle(after) => write!(f, "no data for {}s", after.as_secs()),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Owns the device side of the bridge until it is bound.
pub struct ConnectionManager {
    config: DeviceConfig,
    store: Arc<TelemetryStore>,
    publisher: Arc<dyn SnapshotPublisher>,
    commands: mpsc::Receiver<Outbound>,
    session: Arc<RwLock<Option<SessionInfo>>>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create the manager and the handle other tasks use to reach the device.
    pub fn new(
        config: DeviceConfig,
        store: Arc<TelemetryStore>,
        publisher: Arc<dyn SnapshotPublisher>,
        cancel: CancellationToken,
    ) -> (Self, DeviceHandle) {
        let (tx, commands) = mpsc::channel(config.command_queue.max(1));
        let session = Arc::new(RwLock::new(None));
        let handle = DeviceHandle::new(tx, Arc::clone(&session));
        let manager = Self {
            config,
            store,
            publisher,
            commands,
            session,
            cancel,
        };
        (manager, handle)
    }

    /// Bind the device listener.
    ///
    /// On failure the store moves to `StartupFailed`, viewers are notified
    /// once, and the manager is consumed: every later send reports
    /// `NotConnected`.
    pub async fn bind(self) -> Result<DeviceListener, BindFailure> {
        let addr = self.config.bind_addr();
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                self.commit(self.store.set_status(DeviceStatus::AwaitingDevice));
                let decoder = FrameDecoder::new(self.config.max_frame_bytes);
                Ok(DeviceListener {
                    manager: self,
                    listener,
                    decoder,
                    sessions: 0,
                })
            }
            Err(source) => {
                let failure = BindFailure { addr, source };
                error!(error = %failure, "device listener failed to start");
                self.commit(self.store.set_status(DeviceStatus::StartupFailed(failure.reason())));
                Err(failure)
            }
        }
    }

    fn commit(&self, snapshot: Snapshot) {
        self.publisher.publish(&snapshot);
    }
}

/// A bound connection manager, ready to accept devices.
pub struct DeviceListener {
    manager: ConnectionManager,
    listener: TcpListener,
    decoder: FrameDecoder,
    /// Sessions accepted so far; the current session's id.
    sessions: u64,
}

impl DeviceListener {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve devices one at a time until cancelled.
    pub async fn run(mut self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "device listener started");
        }

        loop {
            let accepted = tokio::select! {
                () = self.manager.cancel.cancelled() => break,
                Some(out) = self.manager.commands.recv() => {
                    let _ = out.reply.send(Err(DeviceError::NotConnected));
                    continue;
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.serve(stream, peer).await,
                Err(e) => {
                    warn!(error = %e, "device accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!("device listener stopped");
    }

    async fn serve(&mut self, stream: TcpStream, peer: SocketAddr) {
        let started = Instant::now();
        self.sessions += 1;
        let id = self.sessions;
        *self.manager.session.write() = Some(SessionInfo {
            id,
            remote: peer,
            connected_at: Utc::now(),
        });
        self.manager
            .commit(self.manager.store.set_status(DeviceStatus::Connected(peer)));
        info!(%peer, session = id, "device connected");

        let end = self.session(stream, peer, id).await;

        *self.manager.session.write() = None;
        self.decoder.reset();
        self.manager
            .commit(self.manager.store.set_status(DeviceStatus::Disconnected));
        info!(
            %peer,
            session = id,
            reason = %end,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "device disconnected"
        );
    }

    async fn session(&mut self, stream: TcpStream, peer: SocketAddr, id: u64) -> SessionEnd {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not set TCP_NODELAY");
        }
        let (mut reader, mut writer) = stream.into_split();
        let read_timeout = self.manager.config.read_timeout;
        let mut deadline = read_timeout.map(|t| tokio::time::Instant::now() + t);

        let end = loop {
            self.decoder
                .buffer_mut()
                .reserve(self.manager.config.read_buffer_bytes);

            tokio::select! {
                () = self.manager.cancel.cancelled() => break SessionEnd::Shutdown,
                Some(out) = self.manager.commands.recv() => {
                    if out.session != id {
                        debug!(%peer, session = out.session, "dropping command queued for an earlier device");
                        let _ = out.reply.send(Err(DeviceError::NotConnected));
                        continue;
                    }
                    let result = write_command(&mut writer, &out.bytes, self.manager.config.write_timeout).await;
                    match &result {
                        Ok(()) => debug!(%peer, bytes = out.bytes.len(), "command written"),
                        Err(e) => warn!(%peer, error = %e, "command write failed"),
                    }
                    let _ = out.reply.send(result);
                }
                read = read_chunk(&mut reader, self.decoder.buffer_mut(), deadline) => match read {
                    Ok(0) => break SessionEnd::PeerClosed,
                    Ok(n) => {
                        debug!(%peer, bytes = n, "device data");
                        if let Some(t) = read_timeout {
                            deadline = Some(tokio::time::Instant::now() + t);
                        }
                        self.drain_frames(peer);
                    }
                    Err(ReadFailure::Idle) => {
                        break SessionEnd::Idle(read_timeout.unwrap_or_default());
                    }
                    Err(ReadFailure::Io(e)) => break SessionEnd::Transport(e.to_string()),
                },
            }
        };

        let _ = writer.shutdown().await;
        end
    }

    fn drain_frames(&mut self, peer: SocketAddr) {
        for outcome in self.decoder.decode() {
            match outcome {
                Ok(frame) => {
                    if !frame.skipped.is_empty() {
                        debug!(%peer, skipped = ?frame.skipped, "ignored non-numeric members");
                    }
                    self.manager
                        .commit(self.manager.store.merge_receiving(frame.fields));
                }
                Err(malformed) => warn!(
                    %peer,
                    reason = %malformed.reason,
                    raw = %String::from_utf8_lossy(&malformed.raw),
                    "malformed device frame"
                ),
            }
        }
    }
}

enum ReadFailure {
    Idle,
    Io(std::io::Error),
}

async fn read_chunk(
    reader: &mut OwnedReadHalf,
    buf: &mut bytes::BytesMut,
    deadline: Option<tokio::time::Instant>,
) -> Result<usize, ReadFailure> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, reader.read_buf(buf))
            .await
            .map_err(|_| ReadFailure::Idle)?
            .map_err(ReadFailure::Io),
        None => reader.read_buf(buf).await.map_err(ReadFailure::Io),
    }
}

async fn write_command(
    writer: &mut OwnedWriteHalf,
    bytes: &Bytes,
    limit: Duration,
) -> Result<(), DeviceError> {
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    match tokio::time::timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeviceError::Transport(e.to_string())),
        Err(_) => Err(DeviceError::Transport(format!(
            "write timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
