//! Viewer liveness via ping/pong.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ViewerConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No pong within the timeout window.
    TimedOut,
    /// Stopped externally.
    Cancelled,
}

/// Watch a viewer's pongs.
///
/// Every `interval` the alive flag is read and cleared. After
/// `timeout / interval` consecutive ticks (at least one) without a pong the
/// viewer is considered gone.
pub async fn run_heartbeat(
    connection: Arc<ViewerConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    let max_missed = max_missed(interval, timeout);
    let mut missed: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

fn max_missed(interval: Duration, timeout: Duration) -> u64 {
    let interval_ms = interval.as_millis().max(1);
    u64::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u64::MAX)
        .max(1)
}
