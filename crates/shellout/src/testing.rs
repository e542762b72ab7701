//! Scripted shell for tests.
//!
//! [`ScriptedShell`] never spawns anything. Each command line is matched
//! against registered prefixes; the first match decides the status and
//! output. Unmatched commands succeed with empty output. Every command run
//! is recorded so tests can assert on what a provider executed.

use crate::command::{CommandOutput, ShellCommand};
use crate::error::{Error, Result};
use crate::Shell;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Timeout,
}

#[derive(Debug, Default)]
struct Script {
    replies: Vec<(String, Reply)>,
    executed: Vec<ShellCommand>,
}

/// A [`Shell`] answering from canned responses.
///
/// Clones share the same script and history, so a test can hand one clone
/// to the code under test and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedShell {
    inner: Rc<RefCell<Script>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `status` and `stdout`.
    pub fn respond(&self, prefix: impl Into<String>, status: i32, stdout: impl Into<String>) -> &Self {
        self.respond_with(prefix, CommandOutput::new(status, stdout, ""))
    }

    pub fn respond_with(&self, prefix: impl Into<String>, output: CommandOutput) -> &Self {
        self.inner
            .borrow_mut()
            .replies
            .push((prefix.into(), Reply::Output(output)));
        self
    }

    /// Make commands starting with `prefix` time out.
    pub fn time_out(&self, prefix: impl Into<String>) -> &Self {
        self.inner
            .borrow_mut()
            .replies
            .push((prefix.into(), Reply::Timeout));
        self
    }

    /// Command lines run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .borrow()
            .executed
            .iter()
            .map(ShellCommand::display)
            .collect()
    }

    /// Full command specs run so far, in order.
    pub fn executed(&self) -> Vec<ShellCommand> {
        self.inner.borrow().executed.clone()
    }

    /// Stdin of the most recent command starting with `prefix`.
    pub fn last_input(&self, prefix: &str) -> Option<String> {
        self.inner
            .borrow()
            .executed
            .iter()
            .rev()
            .find(|c| c.display().starts_with(prefix))
            .and_then(|c| c.input.clone())
    }

    /// Whether any command starting with `prefix` ran.
    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }
}

impl Shell for ScriptedShell {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let display = command.display();
        let reply = {
            let mut script = self.inner.borrow_mut();
            script.executed.push(command.clone());
            script
                .replies
                .iter()
                .find(|(prefix, _)| display.starts_with(prefix.as_str()))
                .map(|(_, reply)| reply.clone())
        };

        match reply {
            Some(Reply::Timeout) => Err(Error::Timeout {
                command: display,
                timeout: command.timeout.unwrap_or(Duration::ZERO),
            }),
            Some(Reply::Output(output)) if !command.returns.accepts(output.status) => {
                Err(Error::Failed {
                    command: display,
                    status: output.status,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            Some(Reply::Output(output)) => Ok(output),
            None => Ok(CommandOutput::default()),
        }
    }
}
