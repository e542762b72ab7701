//! Run configuration
//!
//! Everything that used to be ambient global state (why-run, diff limits,
//! backup location) lives here and is handed to the [`RunContext`]
//! explicitly.
//!
//! [`RunContext`]: crate::context::RunContext

use filekit::{BackupOptions, DiffOptions};
use serde::{Deserialize, Serialize};

/// Settings shared by every provider in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Predict changes without making them
    pub why_run: bool,
    /// Tool name written into crontab section markers
    pub crontab_marker: String,
    /// Diff generation limits
    pub diff: DiffOptions,
    /// Backup location and naming
    pub backup: BackupOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            why_run: false,
            crontab_marker: "Converge".to_string(),
            diff: DiffOptions::default(),
            backup: BackupOptions::default(),
        }
    }
}
