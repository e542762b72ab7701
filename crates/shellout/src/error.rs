//! Error types for command execution.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while running an external command.
#[derive(Debug, Error)]
pub enum Error {
    /// The process could not be started at all
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed
    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        /// Rendered command line
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process did not finish before its deadline and was killed
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout {
        /// Rendered command line
        command: String,
        /// Deadline that expired
        timeout: Duration,
    },

    /// The process exited with a status outside the accepted set
    #[error("`{command}` exited with status {status}{}", stderr_suffix(stderr))]
    Failed {
        /// Rendered command line
        command: String,
        /// Exit status (-1 when killed by a signal)
        status: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
}

impl Error {
    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Exit status of a failed command, if it ran to completion.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Result type for command execution.
pub type Result<T> = std::result::Result<T, Error>;
