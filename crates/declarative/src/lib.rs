//! # Declarative
//!
//! Convergence of declared resources: load what exists, check what must
//! hold, change only what differs.
//!
//! ## Core Concepts
//!
//! - **Resource**: declared desired state with an identity (`type[name]`)
//! - **Provider**: knows how to inspect and converge one resource type;
//!   maps each supported [`Action`] to a handler
//! - **Requirements**: preconditions per action, fatal in real mode and
//!   optionally assumed in why-run
//! - **Converger**: records each change a handler makes, and skips making
//!   it in why-run
//! - **Runner**: converges a [`ResourceCollection`] in declaration order
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Config, Entry, ResourceCollection, RunContext, RunOptions, Runner};
//!
//! let ctx = RunContext::new(Config::default());
//! let mut collection = ResourceCollection::new();
//! collection.push(Entry::new(Box::new(FileProvider::new(motd)), vec![Action::Create]));
//!
//! let report = Runner::new(&ctx, RunOptions::default()).converge(&mut collection);
//! ```
//!
//! ## Collaborators
//!
//! Providers reach the outside world only through the [`RunContext`]:
//!
//! - [`shellout::Shell`]: external commands
//! - [`EventSink`]: progress and change reporting
//! - [`Config`]: why-run, diff and backup settings

pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod provider;
pub mod report;
pub mod requirements;
pub mod resource;
pub mod runner;
pub mod types;

// Re-export main types at crate root
pub use collection::{Entry, ResourceCollection, parse_target};
pub use config::Config;
pub use context::RunContext;
pub use error::{Error, ErrorKind, FailureKind, IoResultExt, Result, ResultExt};
pub use events::{Event, EventSink, LogEvents, NoEvents, RecordingEvents};
pub use provider::{ActionFn, Converge, Converger, Provider, run_action};
pub use report::{ReportStatus, ResourceReport, RunReport, RunSummary, group_by_type};
pub use requirements::{Requirement, Requirements};
pub use resource::Resource;
pub use runner::Runner;
pub use types::{Action, ActionOutcome, ResourceStatus, RunOptions};
