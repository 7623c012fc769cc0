use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::jobs::JobRuntime;
use crate::logs::LogSink;
use crate::worker::{CommandLine, OutputReader, ProcessHandle, EXIT_CODE_UNSET};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    /// Terminal states have no outbound transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::NotStarted => write!(f, "NotStarted"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time copy of a job's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// [`EXIT_CODE_UNSET`] until the process exits with a code.
    pub exit_code: i32,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::NotStarted,
            start_time: None,
            end_time: None,
            exit_code: EXIT_CODE_UNSET,
        }
    }
}

/// Carries the reply channel for a kill request to the waiter, which is the
/// sole owner of the process handle.
type KillRequest = oneshot::Sender<io::Result<()>>;

struct Control {
    status: JobStatus,
    /// Installed before start, handed to the output copier on start.
    sink: Option<LogSink>,
    /// Present exactly while the job is Running.
    kill_tx: Option<mpsc::Sender<KillRequest>>,
}

/// One requested command execution.
///
/// Identity, owner and command are fixed at creation. All status reads and
/// transitions go through a single lock, so callers only ever see complete
/// snapshots.
pub struct Job {
    id: JobId,
    owner: String,
    command: CommandLine,
    control: Mutex<Control>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Create a NotStarted job. Fails with `InvalidArgument` for an empty
    /// program.
    pub fn new(
        owner: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Result<Self> {
        Ok(Self::with_command(owner, CommandLine::new(program, args)?))
    }

    pub fn with_command(owner: impl Into<String>, command: CommandLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            command,
            control: Mutex::new(Control {
                status: JobStatus::default(),
                sink: None,
                kill_tx: None,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub async fn status(&self) -> JobStatus {
        self.control.lock().await.status.clone()
    }

    pub async fn state(&self) -> JobState {
        self.control.lock().await.status.state
    }

    /// Install the sink that receives the process output. Only valid before
    /// the job is started; a job started without a sink discards its output.
    pub async fn attach_log_sink(&self, sink: LogSink) -> Result<()> {
        let mut control = self.control.lock().await;
        if control.status.state != JobState::NotStarted {
            return Err(Error::invalid_state(
                "Job::attach_log_sink",
                format!("job is {}, expected NotStarted", control.status.state),
            ));
        }
        control.sink = Some(sink);
        Ok(())
    }

    /// NotStarted -> Running.
    ///
    /// Returns as soon as the process is launched. Output copying and the
    /// wait for exit run on a background waiter owned by `runtime`.
    ///
    /// A launch failure is terminal: the job moves straight to Failed.
    pub async fn start(self: &Arc<Self>, runtime: &JobRuntime) -> Result<()> {
        const OP: &str = "Job::start";

        let mut control = self.control.lock().await;
        if control.status.state != JobState::NotStarted {
            return Err(Error::invalid_state(
                OP,
                format!("job is {}, expected NotStarted", control.status.state),
            ));
        }

        let mut process = match runtime.launcher().spawn(&self.command) {
            Ok(process) => process,
            Err(e) => {
                control.status.state = JobState::Failed;
                control.status.end_time = Some(Utc::now());
                control.sink = None;
                tracing::error!(
                    job_id = %self.id,
                    command = %self.command,
                    error = %e,
                    "Failed to launch job"
                );
                return Err(Error::internal(OP, "failed to start job", e));
            }
        };

        let output = process.take_output();
        let sink = control.sink.take();
        let (kill_tx, kill_rx) = mpsc::channel(1);

        control.kill_tx = Some(kill_tx);
        control.status.state = JobState::Running;
        control.status.start_time = Some(Utc::now());
        drop(control);

        tracing::info!(
            job_id = %self.id,
            owner = %self.owner,
            command = %self.command,
            "Job started"
        );

        let waiter = Waiter {
            job: Arc::clone(self),
            process,
            kill_rx,
            shutdown: runtime.shutdown_token(),
            drain_timeout: runtime.drain_timeout(),
        };
        runtime.waiters().spawn(waiter.run(output, sink));
        Ok(())
    }

    /// Running -> Stopped.
    ///
    /// The kill is delivered while holding the job lock, so the waiter can
    /// only finalize after this call has decided the outcome. If this future
    /// is dropped once the kill request is queued, the waiter records the
    /// Stopped transition instead.
    pub async fn stop(&self) -> Result<()> {
        const OP: &str = "Job::stop";

        let mut control = self.control.lock().await;
        if control.status.state != JobState::Running {
            return Err(Error::invalid_state(
                OP,
                format!("job is {}, expected Running", control.status.state),
            ));
        }
        let Some(kill_tx) = control.kill_tx.clone() else {
            return Err(Error::new(
                ErrorKind::Internal,
                OP,
                "job has no process to signal",
            ));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let delivered = match kill_tx.send(reply_tx).await {
            Ok(()) => reply_rx
                .await
                .unwrap_or_else(|_| Err(process_already_exited())),
            Err(_) => Err(process_already_exited()),
        };
        if let Err(e) = delivered {
            tracing::warn!(job_id = %self.id, error = %e, "Failed to stop job");
            return Err(Error::internal(OP, "failed to stop job", e));
        }

        control.kill_tx = None;
        control.status.state = JobState::Stopped;
        control.status.end_time = Some(Utc::now());
        tracing::info!(job_id = %self.id, "Job stopped");
        Ok(())
    }

    /// Record the outcome observed by the waiter, unless a concurrent stop
    /// already finalized the job.
    async fn finalize(&self, exit: io::Result<i32>, cancelled: bool) {
        let mut control = self.control.lock().await;
        control.kill_tx = None;

        if control.status.state != JobState::Running {
            tracing::debug!(
                job_id = %self.id,
                state = %control.status.state,
                "Job already finalized"
            );
            return;
        }

        let state = match exit {
            Ok(code) => {
                control.status.exit_code = code;
                if cancelled {
                    JobState::Stopped
                } else {
                    JobState::Completed
                }
            }
            Err(e) => {
                tracing::error!(job_id = %self.id, error = %e, "Failed to wait on job process");
                if cancelled {
                    JobState::Stopped
                } else {
                    JobState::Failed
                }
            }
        };
        control.status.state = state;
        control.status.end_time = Some(Utc::now());

        tracing::info!(
            job_id = %self.id,
            state = %state,
            exit_code = control.status.exit_code,
            "Job finished"
        );
    }
}

fn process_already_exited() -> io::Error {
    io::Error::other("process already exited")
}

/// Background task that owns the process for its whole life.
struct Waiter {
    job: Arc<Job>,
    process: Box<dyn ProcessHandle>,
    kill_rx: mpsc::Receiver<KillRequest>,
    shutdown: CancellationToken,
    drain_timeout: Duration,
}

impl Waiter {
    async fn run(mut self, output: Option<OutputReader>, sink: Option<LogSink>) {
        let job_id = self.job.id;
        let mut copier = tokio::spawn(copy_output(job_id, output, sink));

        let (exit, cancelled) = self.wait_for_exit().await;

        // Pending kill requests must fail before we queue for the job lock,
        // a stop holding the lock is waiting on them.
        drop(self.kill_rx);

        match tokio::time::timeout(self.drain_timeout, &mut copier).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(job_id = %job_id, error = %e, "Log copier panicked"),
            Err(_) => {
                tracing::warn!(
                    job_id = %job_id,
                    "Job output still open after exit, detaching log copier"
                );
                copier.abort();
            }
        }

        self.job.finalize(exit, cancelled).await;
    }

    async fn wait_for_exit(&mut self) -> (io::Result<i32>, bool) {
        let process = self.process.as_mut();
        tokio::select! {
            exit = process.wait() => (exit, false),
            Some(reply) = self.kill_rx.recv() => {
                let killed = process.start_kill();
                let delivered = killed.is_ok();
                // The stop call may be gone by now. A delivered kill still
                // finalizes the job as Stopped.
                let _ = reply.send(killed);
                (process.wait().await, delivered)
            }
            _ = self.shutdown.cancelled() => {
                if let Err(e) = process.start_kill() {
                    tracing::warn!(
                        job_id = %self.job.id,
                        error = %e,
                        "Failed to kill job during shutdown"
                    );
                }
                (process.wait().await, true)
            }
        }
    }
}

/// Copy merged output into the sink until EOF, then close the sink.
async fn copy_output(job_id: JobId, output: Option<OutputReader>, sink: Option<LogSink>) {
    let mut sink: LogSink = match sink {
        Some(sink) => sink,
        None => Box::new(tokio::io::sink()),
    };
    if let Some(mut output) = output {
        if let Err(e) = tokio::io::copy(&mut output, &mut sink).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to copy job output");
        }
    }
    if let Err(e) = sink.shutdown().await {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to close log sink");
    }
}
