//! Error types for crontab entries.

use thiserror::Error;

/// Errors raised while validating a cron entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A schedule field is malformed or out of range
    #[error("invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The same setting is declared twice with different values
    #[error("{key} is set both as a property ('{property}') and in environment ('{environment}')")]
    Conflict {
        key: &'static str,
        property: String,
        environment: String,
    },

    /// Entry has nothing to run
    #[error("a command is required")]
    MissingCommand,

    /// Unknown `@special` schedule
    #[error("unknown special time '{0}'")]
    UnknownSpecialTime(String),
}

/// Result type for crontab operations.
pub type Result<T> = std::result::Result<T, Error>;
