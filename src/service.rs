//! Owner-aware job operations.
//!
//! Every call carries the caller's identity, already authenticated by the
//! transport. Lookups check existence first and ownership second, so a
//! non-owner learns that a job exists but nothing else about it.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::jobs::{Job, JobId, JobRuntime, JobStatus, JobStore};
use crate::logs::LogStore;
use crate::worker::CommandLine;

pub struct JobService {
    store: Arc<JobStore>,
    logs: Arc<dyn LogStore>,
    runtime: JobRuntime,
    retain_logs_on_shutdown: bool,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, logs: Arc<dyn LogStore>, runtime: JobRuntime) -> Self {
        Self {
            store,
            logs,
            runtime,
            retain_logs_on_shutdown: false,
        }
    }

    /// Keep log files on disk after [`JobService::shutdown`].
    pub fn with_retained_logs(mut self, retain: bool) -> Self {
        self.retain_logs_on_shutdown = retain;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn runtime(&self) -> &JobRuntime {
        &self.runtime
    }

    /// Create a job for `owner` and launch it.
    ///
    /// The job is registered before launch. If the launch fails the job stays
    /// registered in the Failed state, but its ID is never returned.
    pub async fn start(&self, owner: &str, program: &str, args: Vec<String>) -> Result<JobId> {
        require_owner("JobService::start", owner)?;
        let job = Job::new(owner, program, args)?;
        self.launch(job).await
    }

    /// Like [`JobService::start`], taking a single shell-quoted command line.
    pub async fn start_command_line(&self, owner: &str, line: &str) -> Result<JobId> {
        require_owner("JobService::start", owner)?;
        let command = CommandLine::parse(line)?;
        self.launch(Job::with_command(owner, command)).await
    }

    async fn launch(&self, job: Job) -> Result<JobId> {
        let job = Arc::new(job);
        let job_id = job.id();

        let sink = self.logs.create_sink(job_id).await?;
        job.attach_log_sink(sink).await?;
        self.store.store(job.clone()).await;

        job.start(&self.runtime).await?;
        Ok(job_id)
    }

    pub async fn stop(&self, owner: &str, job_id: &str) -> Result<()> {
        let job = self.owned_job("JobService::stop", owner, job_id).await?;
        job.stop().await
    }

    /// Snapshot of the job's status at the time of the call.
    pub async fn get(&self, owner: &str, job_id: &str) -> Result<JobStatus> {
        let job = self.owned_job("JobService::get", owner, job_id).await?;
        Ok(job.status().await)
    }

    /// Everything the job has written so far.
    pub async fn get_logs(&self, owner: &str, job_id: &str) -> Result<Vec<u8>> {
        const OP: &str = "JobService::get_logs";

        let job = self.owned_job(OP, owner, job_id).await?;
        let mut source = self.logs.open_source(job.id()).await?;

        // Logs are assumed to fit in memory; there is no streaming read.
        let mut buf = Vec::new();
        source
            .read_to_end(&mut buf)
            .await
            .map_err(|e| Error::internal(OP, "failed to read logs", e))?;
        Ok(buf)
    }

    /// Engine teardown: kill running jobs, wait for every waiter to close
    /// its sink, then apply the log retention policy.
    pub async fn shutdown(&self) -> Result<()> {
        self.runtime.shutdown().await;
        if !self.retain_logs_on_shutdown {
            self.logs.remove_all().await?;
        }
        Ok(())
    }

    async fn owned_job(&self, op: &'static str, owner: &str, job_id: &str) -> Result<Arc<Job>> {
        require_owner(op, owner)?;
        let job = match Uuid::parse_str(job_id) {
            Ok(id) => self.store.get(&id).await,
            Err(_) => None,
        };
        let job = job.ok_or_else(|| Error::not_found(op, "job does not exist"))?;

        if job.owner() != owner {
            tracing::warn!(
                job_id = %job.id(),
                caller = owner,
                "Rejected access to job owned by another user"
            );
            return Err(Error::unauthorized(op, "user is unauthorized to access this job"));
        }
        Ok(job)
    }
}

fn require_owner(op: &'static str, owner: &str) -> Result<()> {
    if owner.trim().is_empty() {
        return Err(Error::unauthorized(op, "caller identity is missing"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::logs::{LogSink, LogSource};
    use async_trait::async_trait;

    /// Log store whose sinks can never be created.
    struct BrokenLogStore;

    #[async_trait]
    impl LogStore for BrokenLogStore {
        async fn create_sink(&self, _job_id: JobId) -> Result<LogSink> {
            Err(Error::internal(
                "BrokenLogStore::create_sink",
                "disk full",
                std::io::Error::other("disk full"),
            ))
        }

        async fn open_source(&self, _job_id: JobId) -> Result<LogSource> {
            Err(Error::not_found("BrokenLogStore::open_source", "no logs"))
        }

        async fn remove_all(&self) -> Result<()> {
            Ok(())
        }
    }

    fn broken_service() -> JobService {
        JobService::new(
            Arc::new(JobStore::new()),
            Arc::new(BrokenLogStore),
            JobRuntime::default(),
        )
    }

    #[tokio::test]
    async fn sink_failure_abandons_job() {
        let service = broken_service();
        let err = service
            .start("alice", "echo", vec!["hi".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(service.store().is_empty().await);
    }

    #[tokio::test]
    async fn empty_command_is_invalid_argument() {
        let service = broken_service();
        let err = service.start("alice", "", vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service.start_command_line("alice", "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(service.store().is_empty().await);
    }

    #[tokio::test]
    async fn missing_owner_is_unauthorized() {
        let service = broken_service();
        let err = service.start("", "echo", vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let id = Uuid::new_v4().to_string();
        let err = service.get(" ", &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn malformed_job_id_is_not_found() {
        let service = broken_service();
        let err = service.get("alice", "not-a-uuid").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
