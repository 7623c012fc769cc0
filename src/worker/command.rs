use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Program and arguments of a job. Executed directly, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(Error::invalid_argument(
                "CommandLine::new",
                "command cannot be empty",
            ));
        }
        Ok(Self { program, args })
    }

    /// Split a wire-level command line with POSIX shell quoting rules.
    ///
    /// `echo 'hello world'` becomes program `echo` with a single argument.
    pub fn parse(line: &str) -> Result<Self> {
        let words = shell_words::split(line).map_err(|e| {
            Error::invalid_argument("CommandLine::parse", format!("malformed command: {}", e))
        })?;
        let mut words = words.into_iter();
        let program = words.next().unwrap_or_default();
        Self::new(program, words.collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(self.args.iter());
        write!(f, "{}", shell_words::join(words))
    }
}
