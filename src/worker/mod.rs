//! Process launching for jobs.
//!
//! This module is the boundary between the job engine and the operating system:
//! - **Command lines**: validated program + arguments, parsed with shell quoting
//! - **Launching**: spawns the process with stdout and stderr merged into one stream
//! - **Termination**: best-effort kill, reported back to the caller
//!
//! # Components
//!
//! - [`CommandLine`]: what to run
//! - [`Launcher`]: creates processes; [`OsLauncher`] is the real implementation
//! - [`ProcessHandle`]: wait/kill primitives over one launched process
//!
//! # Platform notes
//!
//! Exit codes follow the platform: a process killed by a signal has no code
//! and reports [`EXIT_CODE_UNSET`].

pub mod command;
pub mod launcher;

pub use command::CommandLine;
pub use launcher::{Launcher, OsLauncher, OutputReader, ProcessHandle, EXIT_CODE_UNSET};
