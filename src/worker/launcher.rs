use std::io;
use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_stream::StreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::worker::CommandLine;

/// Exit code reported while a process has not exited, or when it was
/// terminated by a signal and therefore has no code.
pub const EXIT_CODE_UNSET: i32 = -1;

/// Merged stdout and stderr of a launched process.
pub type OutputReader = Pin<Box<dyn AsyncRead + Send>>;

/// A launched OS process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Combined output stream. Yields `Some` exactly once.
    fn take_output(&mut self) -> Option<OutputReader>;

    /// Block until the process exits and return its exit code.
    async fn wait(&mut self) -> io::Result<i32>;

    /// Send the termination signal without waiting for the process to exit.
    fn start_kill(&mut self) -> io::Result<()>;
}

/// The only point of contact between the job engine and the OS.
pub trait Launcher: Send + Sync {
    /// Launch `command`. Errors are OS launch failures (missing binary,
    /// permission denied, ...).
    fn spawn(&self, command: &CommandLine) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Launches commands as direct child processes of the server.
///
/// - stdin is closed
/// - stdout and stderr are piped and merged in arrival order
/// - SIGKILL is used for termination, and a handle that is dropped
///   kills its process
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for OsLauncher {
    fn spawn(&self, command: &CommandLine) -> io::Result<Box<dyn ProcessHandle>> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tracing::debug!(pid = ?child.id(), command = %command, "Process launched");

        let output = merge_output(child.stdout.take(), child.stderr.take());
        Ok(Box::new(OsProcess { child, output }))
    }
}

fn merge_output(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Option<OutputReader> {
    let merged = ReaderStream::new(stdout?).merge(ReaderStream::new(stderr?));
    Some(Box::pin(StreamReader::new(merged)))
}

struct OsProcess {
    child: Child,
    output: Option<OutputReader>,
}

#[async_trait]
impl ProcessHandle for OsProcess {
    fn take_output(&mut self) -> Option<OutputReader> {
        self.output.take()
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(EXIT_CODE_UNSET))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}
