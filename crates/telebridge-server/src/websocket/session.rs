//! A single viewer's WebSocket lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::broadcast::BroadcastHub;
use super::heartbeat::{HeartbeatResult, run_heartbeat};

/// Heartbeat timing for viewer sockets.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatConfig {
    /// Ping interval.
    pub interval: Duration,
    /// Close after this long without a pong.
    pub timeout: Duration,
}

/// Serve one viewer until it leaves, stops answering pings, or the server
/// shuts down.
///
/// The viewer is subscribed on entry (receiving the current snapshot first)
/// and unsubscribed on every exit path.
pub async fn handle_viewer(
    socket: WebSocket,
    hub: Arc<BroadcastHub>,
    heartbeat: HeartbeatConfig,
    shutdown: CancellationToken,
) {
    let (conn, mut rx) = hub.subscribe();
    let viewer_id = conn.id.clone();
    info!(%viewer_id, viewers = hub.viewer_count(), "viewer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let cancel = shutdown.child_token();

    let mut writer = {
        let cancel = cancel.clone();
        let viewer_id = viewer_id.clone();
        tokio::spawn(async move {
            let mut ping = time::interval_at(time::Instant::now() + heartbeat.interval, heartbeat.interval);
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                        trace!(%viewer_id, "sent ping");
                    }
                    () = cancel.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        })
    };

    let mut reader = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    Message::Pong(_) => conn.mark_alive(),
                    Message::Text(text) => {
                        conn.mark_alive();
                        debug!(viewer_id = %conn.id, len = text.as_str().len(), "ignoring viewer text frame");
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Binary(_) => {}
                }
            }
        })
    };

    let mut monitor = tokio::spawn(run_heartbeat(
        Arc::clone(&conn),
        heartbeat.interval,
        heartbeat.timeout,
        cancel.clone(),
    ));

    let reason = tokio::select! {
        _ = &mut writer => "send side closed",
        _ = &mut reader => "viewer closed",
        result = &mut monitor => match result {
            Ok(HeartbeatResult::TimedOut) => "heartbeat timeout",
            Ok(HeartbeatResult::Cancelled) | Err(_) => "shutdown",
        },
    };

    cancel.cancel();
    writer.abort();
    reader.abort();
    monitor.abort();

    let _ = hub.unsubscribe(&viewer_id);
    info!(
        %viewer_id,
        reason,
        dropped = conn.drop_count(),
        connected_secs = conn.age().as_secs(),
        viewers = hub.viewer_count(),
        "viewer disconnected"
    );
}
