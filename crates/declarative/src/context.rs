//! Run context
//!
//! Providers never reach for globals: configuration, the shell used for
//! external commands and the event sink all come from the [`RunContext`]
//! they are handed.

use crate::config::Config;
use crate::error::{Result, ResultExt};
use crate::events::{EventSink, LogEvents};
use filekit::{BackupManager, DiffEngine};
use shellout::{CommandOutput, Shell, ShellCommand, SystemShell};

/// Everything a provider may consult during a run.
pub struct RunContext {
    config: Config,
    shell: Box<dyn Shell>,
    events: Box<dyn EventSink>,
}

impl RunContext {
    /// A context running real commands and logging events.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shell: Box::new(SystemShell),
            events: Box::new(LogEvents),
        }
    }

    pub fn with_shell(mut self, shell: impl Shell + 'static) -> Self {
        self.shell = Box::new(shell);
        self
    }

    pub fn with_events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn why_run(&self) -> bool {
        self.config.why_run
    }

    pub fn shell(&self) -> &dyn Shell {
        self.shell.as_ref()
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(self.config.backup.clone())
    }

    pub fn diff_engine(&self) -> DiffEngine {
        DiffEngine::new(self.config.diff.clone())
    }

    /// Run a command on behalf of `resource`, tagging failures with it.
    pub fn run(&self, resource: &str, command: &ShellCommand) -> Result<CommandOutput> {
        log::debug!("{resource}: running {}", command.display());
        self.shell.run(command).for_resource(resource)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
