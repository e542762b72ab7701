//! # Shellout
//!
//! Blocking execution of external commands for resource providers.
//!
//! A [`ShellCommand`] describes what to run: program, arguments, working
//! directory, environment, the user/group to run as, an optional timeout,
//! bytes to feed on stdin and the set of exit statuses that count as
//! success. A [`Shell`] runs it and returns a [`CommandOutput`].
//!
//! Providers only ever see the [`Shell`] trait, so tests can substitute a
//! [`testing::ScriptedShell`] that answers from canned responses.
//!
//! ```ignore
//! use shellout::{Shell, ShellCommand, SystemShell};
//! use std::time::Duration;
//!
//! let cmd = ShellCommand::new("crontab")
//!     .args(["-l", "-u", "root"])
//!     .returns([0, 1])
//!     .timeout(Duration::from_secs(60));
//! let output = SystemShell.run(&cmd)?;
//! ```

pub mod command;
pub mod error;
pub mod system;
pub mod testing;

pub use command::{CommandOutput, Returns, ShellCommand};
pub use error::{Error, Result};
pub use system::SystemShell;

/// Something that can execute a [`ShellCommand`].
///
/// Implementations block the calling thread until the process exits or its
/// timeout expires.
pub trait Shell {
    /// Run the command, returning its output if the exit status is accepted.
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput>;
}

impl<S: Shell + ?Sized> Shell for Box<S> {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        (**self).run(command)
    }
}
