//! Subprocess transport for the command-line tools the Robots drive.
//!
//! Android Robots talk to `adb`, Simulator Robots to `xcrun simctl`, and
//! physical iOS Robots query `ios` (go-ios) for device information. All of
//! them go through the [`CommandRunner`] trait so tests can substitute a
//! scripted runner for the real [`TokioRunner`].

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Errors that can occur while running an external command.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within its timeout and was killed.
    #[error("{command} timed out after {}ms", .after.as_millis())]
    Timeout { command: String, after: Duration },

    /// The command exited with a non-zero status.
    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// A successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// A failed output carrying `stderr`.
    pub fn failed(stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Standard output decoded lossily as UTF-8.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A single command invocation: program, arguments and an optional timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Builds an invocation without a timeout.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// Sets the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The full command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Runs external commands.
///
/// Implementations must not fail on a non-zero exit status; that is reported
/// through [`CommandOutput::success`] so callers can inspect stderr. Use
/// [`run_checked`] when a non-zero exit should be an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so an expired timeout kills the
/// process rather than leaving it running.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError> {
        trace!(command = %invocation, "spawning");

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let wait = child.wait_with_output();
        let output = match invocation.timeout {
            Some(after) => tokio::time::timeout(after, wait)
                .await
                .map_err(|_| ShellError::Timeout {
                    command: invocation.command_line(),
                    after,
                })?,
            None => wait.await,
        }
        .map_err(|source| ShellError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        debug!(
            command = %invocation,
            status = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            "command finished"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Runs `invocation` and turns a non-zero exit status into
/// [`ShellError::Failed`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> Result<CommandOutput, ShellError> {
    let output = runner.run(invocation).await?;
    if !output.success {
        let stderr = output.stderr_str();
        let stderr = if stderr.trim().is_empty() {
            output.stdout_str()
        } else {
            stderr
        };
        return Err(ShellError::Failed {
            command: invocation.command_line(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(output)
}
