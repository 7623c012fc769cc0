use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::worker::{Launcher, OsLauncher};

pub const DEFAULT_OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches jobs and owns their background waiters.
///
/// Waiters are detached from the callers that start jobs. The runtime
/// tracks them so the hosting server can tear them all down at exit.
#[derive(Clone)]
pub struct JobRuntime {
    launcher: Arc<dyn Launcher>,
    waiters: TaskTracker,
    shutdown: CancellationToken,
    drain_timeout: Duration,
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self::new(Arc::new(OsLauncher::new()))
    }
}

impl JobRuntime {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            waiters: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            drain_timeout: DEFAULT_OUTPUT_DRAIN_TIMEOUT,
        }
    }

    /// How long a waiter keeps copying output after its process exited.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn launcher(&self) -> &dyn Launcher {
        self.launcher.as_ref()
    }

    pub(crate) fn waiters(&self) -> &TaskTracker {
        &self.waiters
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of waiters that have not finished yet.
    pub fn active_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Kill every running process and wait until each waiter has closed
    /// its log sink and recorded the final state.
    pub async fn shutdown(&self) {
        let pending = self.waiters.len();
        tracing::info!(pending, "Shutting down job runtime");
        self.shutdown.cancel();
        self.waiters.close();
        self.waiters.wait().await;
        tracing::info!("Job runtime stopped");
    }
}
