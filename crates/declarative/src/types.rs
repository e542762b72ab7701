//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An operation requested on a resource.
///
/// Each provider maps the actions it supports to handler functions; any
/// other action is rejected as unsupported. `Nothing` is accepted by every
/// provider and never changes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Nothing,
    Create,
    CreateIfMissing,
    Delete,
    Touch,
    Run,
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
    Mask,
    Unmask,
    DeleteKey,
}

impl Action {
    pub const ALL: [Self; 15] = [
        Self::Nothing,
        Self::Create,
        Self::CreateIfMissing,
        Self::Delete,
        Self::Touch,
        Self::Run,
        Self::Start,
        Self::Stop,
        Self::Restart,
        Self::Reload,
        Self::Enable,
        Self::Disable,
        Self::Mask,
        Self::Unmask,
        Self::DeleteKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
            Self::Delete => "delete",
            Self::Touch => "touch",
            Self::Run => "run",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Mask => "mask",
            Self::Unmask => "unmask",
            Self::DeleteKey => "delete_key",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Bookkeeping a provider keeps on the resource it converges.
///
/// `updated` is written only by the convergence protocol. `diff` is
/// reporting data a provider may backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub updated: bool,
    pub diff: Option<String>,
}

impl ResourceStatus {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of running one action on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Resource identity, `type[name]`
    pub resource: String,
    pub action: Action,
    /// Whether anything changed (or would have, in why-run)
    pub updated: bool,
    /// Whether a failed requirement stopped the action in why-run
    pub bypassed: bool,
    /// Descriptions of each change made
    pub changes: Vec<String>,
    /// Content diff attached by the provider, if any
    pub diff: Option<String>,
}

/// Options for a convergence run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep going after a resource fails instead of stopping the run
    pub continue_on_failure: bool,
}
