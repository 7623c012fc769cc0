//! Test harness for job engine integration tests.
//!
//! Provides a service backed by real OS processes and a temporary log
//! directory, plus polling helpers for asynchronous state changes.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use runnable::jobs::{JobRuntime, JobStatus, JobStore};
use runnable::logs::FileLogStore;
use runnable::service::JobService;

/// Drain timeout used by test runtimes. Short enough that tests never wait
/// on it, long enough that output of short commands is never cut off.
pub const TEST_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to a service whose logs live in a temporary directory
pub struct TestService {
    pub service: Arc<JobService>,
    pub log_dir: PathBuf,
    // Dropped last so the directory outlives every job.
    _tmp: TempDir,
}

impl TestService {
    /// Create a service that removes its logs on shutdown
    pub async fn new() -> Self {
        Self::build(false).await
    }

    /// Create a service that keeps its logs on shutdown
    #[allow(dead_code)]
    pub async fn retaining_logs() -> Self {
        Self::build(true).await
    }

    async fn build(retain_logs: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("logs");
        let logs = FileLogStore::new(&log_dir).await.unwrap();
        let runtime = JobRuntime::default().with_drain_timeout(TEST_DRAIN_TIMEOUT);
        let service = JobService::new(Arc::new(JobStore::new()), Arc::new(logs), runtime)
            .with_retained_logs(retain_logs);

        Self {
            service: Arc::new(service),
            log_dir,
            _tmp: tmp,
        }
    }

    /// Wait until the job reaches a terminal state and return its status
    pub async fn wait_for_terminal(&self, owner: &str, job_id: &str) -> JobStatus {
        let reached = wait_for(
            || async {
                self.service
                    .get(owner, job_id)
                    .await
                    .map(|status| status.state.is_terminal())
                    .unwrap_or(false)
            },
            Duration::from_secs(10),
            Duration::from_millis(20),
        )
        .await;
        assert!(reached, "job {} did not finish in time", job_id);
        self.service.get(owner, job_id).await.unwrap()
    }

    /// Captured output as a string
    #[allow(dead_code)]
    pub async fn logs(&self, owner: &str, job_id: &str) -> String {
        let bytes = self.service.get_logs(owner, job_id).await.unwrap();
        String::from_utf8(bytes).unwrap()
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(20)).await;
    assert!(result, "{}", message);
}
