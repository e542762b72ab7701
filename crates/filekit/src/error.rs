//! Error types for file convergence helpers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by backups, deploys and access-control reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    /// Named user has no account on this system
    #[error("user '{0}' does not exist")]
    NoSuchUser(String),

    /// Named group does not exist on this system
    #[error("group '{0}' does not exist")]
    NoSuchGroup(String),

    /// Mode string is not an octal permission value
    #[error("invalid mode '{0}': expected an octal value such as 0644")]
    InvalidMode(String),

    /// Account database lookup itself failed
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Path cannot be handed to the operating system
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Operation has no implementation on this platform
    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),

    /// Filesystem operation failed
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build a closure wrapping an `io::Error` with context, for `map_err`.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Whether this error is an unknown user or group.
    pub fn is_unknown_principal(&self) -> bool {
        matches!(self, Self::NoSuchUser(_) | Self::NoSuchGroup(_))
    }
}

/// Result type for file convergence helpers.
pub type Result<T> = std::result::Result<T, Error>;
