//! Process shutdown: one cancellation token shared by every bridge task, a
//! registry of the long-lived tasks, and a bounded drain that aborts
//! stragglers.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Grace period the binary gives bridge tasks to stop.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

struct BridgeTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// How each registered task ended during [`ShutdownCoordinator::drain`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Stopped on their own within the grace period.
    pub finished: Vec<&'static str>,
    /// Panicked or were cancelled elsewhere.
    pub failed: Vec<&'static str>,
    /// Still running at the deadline and aborted.
    pub aborted: Vec<&'static str>,
}

impl DrainReport {
    /// Every task stopped on its own.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_empty()
    }
}

/// Shared cancellation for the device listener, the viewer server, and every
/// viewer connection.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<BridgeTask>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Clone of the token, for a task to watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a long-lived bridge task that [`drain`](Self::drain) waits for.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.lock().push(BridgeTask { name, handle });
    }

    /// Number of registered tasks not yet drained.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for Ctrl-C, SIGTERM, or a programmatic [`shutdown`](Self::shutdown),
    /// then fire the token. Returns what triggered it.
    pub async fn wait_for_signal(&self) -> std::io::Result<&'static str> {
        #[cfg(unix)]
        let terminate = {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            async move {
                let _ = term.recv().await;
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let source = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                "ctrl-c"
            }
            () = terminate => "SIGTERM",
            () = self.token.cancelled() => "shutdown requested",
        };
        info!(source, "shutdown signal received");
        self.shutdown();
        Ok(source)
    }

    /// Fire the token, then give registered tasks until `grace` elapses to
    /// stop. Tasks still running at the deadline are aborted.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        self.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(
            tasks = tasks.len(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "draining bridge tasks"
        );

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = DrainReport::default();
        for mut task in tasks {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(())) => report.finished.push(task.name),
                Ok(Err(e)) => {
                    warn!(task = task.name, error = %e, "bridge task failed");
                    report.failed.push(task.name);
                }
                Err(_) => {
                    task.handle.abort();
                    warn!(task = task.name, "bridge task aborted at shutdown deadline");
                    report.aborted.push(task.name);
                }
            }
        }
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
