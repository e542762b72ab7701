//! Command description and captured output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Exit statuses that count as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Returns {
    /// Only the listed statuses are accepted
    Codes(Vec<i32>),
    /// Every status is accepted; the caller inspects it
    Any,
}

impl Default for Returns {
    fn default() -> Self {
        Self::Codes(vec![0])
    }
}

impl Returns {
    /// Check whether `status` is accepted.
    pub fn accepts(&self, status: i32) -> bool {
        match self {
            Self::Codes(codes) => codes.contains(&status),
            Self::Any => true,
        }
    }
}

/// A command to run.
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub timeout: Option<Duration>,
    pub input: Option<String>,
    pub returns: Returns,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Run `script` through `/bin/sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Text written to the process's stdin.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn returns<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.returns = Returns::Codes(codes.into_iter().collect());
        self
    }

    pub fn returns_any(mut self) -> Self {
        self.returns = Returns::Any;
        self
    }

    /// Render the command line for logs and error messages.
    ///
    /// Arguments containing whitespace or quotes are single-quoted.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (-1 when killed by a signal)
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_returns_zero_only() {
        let cmd = ShellCommand::new("true");
        assert!(cmd.returns.accepts(0));
        assert!(!cmd.returns.accepts(1));
    }

    #[test]
    fn test_returns_codes() {
        let cmd = ShellCommand::new("crontab").returns([0, 1]);
        assert!(cmd.returns.accepts(1));
        assert!(!cmd.returns.accepts(2));
        assert!(ShellCommand::new("x").returns_any().returns.accepts(127));
    }

    #[test]
    fn test_display_quotes_arguments() {
        let cmd = ShellCommand::shell("echo 'hi there'");
        assert_eq!(cmd.display(), r"/bin/sh -c 'echo '\''hi there'\'''");

        let cmd = ShellCommand::new("systemctl").args(["--system", "show", "nginx"]);
        assert_eq!(cmd.display(), "systemctl --system show nginx");
    }
}
