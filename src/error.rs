use std::fmt;

use thiserror::Error;

/// Closed set of failure categories surfaced by the job engine.
///
/// The API layer maps each kind onto a transport status; nothing in the
/// engine inspects error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, e.g. an empty command.
    InvalidArgument,
    /// The operation is not valid for the job's current state.
    InvalidState,
    /// Unknown job ID.
    NotFound,
    /// The job exists but belongs to another owner.
    Unauthorized,
    /// OS-level failure: launch, signal delivery, log I/O.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::InvalidState => write!(f, "invalid state"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{op}: {message}")]
pub struct Error {
    kind: ErrorKind,
    op: &'static str,
    message: String,
    #[source]
    source: Option<std::io::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, op: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            op,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_argument(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, op, message)
    }

    pub fn invalid_state(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, op, message)
    }

    pub fn not_found(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, op, message)
    }

    pub fn unauthorized(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, op, message)
    }

    /// Internal failure wrapping the OS error that caused it.
    pub fn internal(op: &'static str, message: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Internal,
            op,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Name of the operation that failed, e.g. `Job::stop`.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, Error>;
