//! Error types for convergence.
//!
//! Every error names the resource it belongs to (`type[name]`) so a failure
//! is actionable from the message alone. Errors are grouped into
//! [`ErrorKind`]s so callers can decide whether to continue a run.

use crate::types::Action;
use std::fmt;
use thiserror::Error;

/// Broad class of a convergence error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A declared requirement did not hold
    Assertion,
    /// Current state could not be determined
    Inspection,
    /// The provider has no handler for the action
    UnsupportedAction,
    /// An external command exited with an unaccepted status
    CommandFailed,
    /// An external command ran past its timeout
    Timeout,
    /// The declaration contradicts itself
    Conflict,
    /// The declaration is malformed
    Invalid,
    /// Filesystem operation failed
    Io,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Assertion => "Requirement not met",
            Self::Inspection => "Could not inspect current state",
            Self::UnsupportedAction => "Action not supported",
            Self::CommandFailed => "Command failed",
            Self::Timeout => "Command timed out",
            Self::Conflict => "Conflicting declaration",
            Self::Invalid => "Invalid declaration",
            Self::Io => "Filesystem error",
        }
    }
}

/// The specific precondition behind an assertion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    EnclosingDirectoryDoesNotExist,
    InsufficientPermissions,
    FileTypeMismatch,
    InvalidSymlink,
    UserIdNotFound,
    GroupIdNotFound,
    ChecksumMismatch,
    ServiceNotFound,
    ServiceMasked,
    UnsupportedPlatform,
    InvalidPath,
    RegistryKeyMissing,
    Generic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EnclosingDirectoryDoesNotExist => "enclosing directory does not exist",
            Self::InsufficientPermissions => "insufficient permissions",
            Self::FileTypeMismatch => "file type mismatch",
            Self::InvalidSymlink => "invalid symlink",
            Self::UserIdNotFound => "user not found",
            Self::GroupIdNotFound => "group not found",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::ServiceNotFound => "service not found",
            Self::ServiceMasked => "service masked",
            Self::UnsupportedPlatform => "unsupported platform",
            Self::InvalidPath => "invalid path",
            Self::RegistryKeyMissing => "registry key missing",
            Self::Generic => "requirement failed",
        };
        f.write_str(name)
    }
}

/// Errors raised while converging a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// A requirement's predicate failed
    #[error("{resource}: {message}")]
    Requirement {
        resource: String,
        failure: FailureKind,
        message: String,
    },

    /// Current state could not be determined
    #[error("{resource}: could not determine current state: {message}")]
    Inspection { resource: String, message: String },

    /// No handler for the requested action
    #[error("{resource}: action '{action}' is not supported")]
    UnsupportedAction { resource: String, action: Action },

    /// External command failed or timed out
    #[error("{resource}: {source}")]
    Command {
        resource: String,
        #[source]
        source: shellout::Error,
    },

    /// Declaration contradicts itself
    #[error("{resource}: conflicting declaration: {message}")]
    Conflict { resource: String, message: String },

    /// Declaration is malformed
    #[error("{resource}: invalid declaration: {message}")]
    Invalid { resource: String, message: String },

    /// Backup, deploy or access-control failure
    #[error("{resource}: {source}")]
    File {
        resource: String,
        #[source]
        source: filekit::Error,
    },

    /// Filesystem operation failed
    #[error("{resource}: {context}: {source}")]
    Io {
        resource: String,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Requirement { .. } => ErrorKind::Assertion,
            Self::Inspection { .. } => ErrorKind::Inspection,
            Self::UnsupportedAction { .. } => ErrorKind::UnsupportedAction,
            Self::Command { source, .. } if source.is_timeout() => ErrorKind::Timeout,
            Self::Command { .. } => ErrorKind::CommandFailed,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::File { .. } | Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Identity of the resource the error belongs to.
    pub fn resource(&self) -> &str {
        match self {
            Self::Requirement { resource, .. }
            | Self::Inspection { resource, .. }
            | Self::UnsupportedAction { resource, .. }
            | Self::Command { resource, .. }
            | Self::Conflict { resource, .. }
            | Self::Invalid { resource, .. }
            | Self::File { resource, .. }
            | Self::Io { resource, .. } => resource,
        }
    }

    /// The failure kind of an assertion error.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Requirement { failure, .. } => Some(*failure),
            _ => None,
        }
    }

    pub fn inspection(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inspection {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn invalid(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn requirement(
        resource: impl Into<String>,
        failure: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Requirement {
            resource: resource.into(),
            failure,
            message: message.into(),
        }
    }
}

/// Attach a resource identity to collaborator errors.
pub trait ResultExt<T> {
    fn for_resource(self, resource: &str) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, shellout::Error> {
    fn for_resource(self, resource: &str) -> Result<T> {
        self.map_err(|source| Error::Command {
            resource: resource.to_string(),
            source,
        })
    }
}

impl<T> ResultExt<T> for std::result::Result<T, filekit::Error> {
    fn for_resource(self, resource: &str) -> Result<T> {
        self.map_err(|source| Error::File {
            resource: resource.to_string(),
            source,
        })
    }
}

/// Attach a resource identity and context to I/O errors.
pub trait IoResultExt<T> {
    fn io_context(self, resource: &str, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context(self, resource: &str, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| Error::Io {
            resource: resource.to_string(),
            context: context(),
            source,
        })
    }
}

/// Result type for convergence.
pub type Result<T> = std::result::Result<T, Error>;
