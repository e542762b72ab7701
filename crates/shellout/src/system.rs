//! Real process execution via `std::process`.

use crate::command::{CommandOutput, ShellCommand};
use crate::error::{Error, Result};
use crate::Shell;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shell that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let display = command.display();
        log::debug!("running `{display}`");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(if command.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if let Some(gid) = command.gid {
                cmd.gid(gid);
            }
            if let Some(uid) = command.uid {
                cmd.uid(uid);
            }
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: display.clone(),
            source,
        })?;

        // Writer and readers run on their own threads so a chatty process
        // cannot deadlock on a full pipe.
        if let (Some(input), Some(mut stdin)) = (command.input.clone(), child.stdin.take()) {
            let display = display.clone();
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(input.as_bytes()) {
                    log::debug!("writing stdin of `{display}` failed: {e}");
                }
            });
        }
        let stdout = child.stdout.take().map(|r| drain(r, format!("stdout of `{display}`")));
        let stderr = child.stderr.take().map(|r| drain(r, format!("stderr of `{display}`")));

        let status = match command.timeout {
            Some(timeout) => wait_until(&mut child, timeout),
            None => child.wait().map(Some),
        }
        .map_err(|source| Error::Wait {
            command: display.clone(),
            source,
        })?;

        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            log::warn!("`{display}` killed after exceeding its timeout");
            return Err(Error::Timeout {
                command: display,
                timeout: command.timeout.unwrap_or_default(),
            });
        };

        let output = CommandOutput {
            status: status.code().unwrap_or(-1),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        log::debug!("`{display}` exited with status {}", output.status);

        if command.returns.accepts(output.status) {
            Ok(output)
        } else {
            Err(Error::Failed {
                command: display,
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

/// Poll the child until it exits or the deadline passes.
fn wait_until(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Read `reader` to the end on its own thread; a read error keeps what arrived.
fn drain<R: Read + Send + 'static>(mut reader: R, label: String) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            log::debug!("reading {label} failed after {} bytes: {e}", buf.len());
        }
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
