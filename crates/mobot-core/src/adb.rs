//! Per-device Android Debug Bridge invocations.

use std::sync::Arc;
use std::time::Duration;

use crate::robot::RobotError;
use crate::shell::{run_checked, CommandOutput, CommandRunner, Invocation};

/// `adb -s <serial>` bound to one device.
#[derive(Clone)]
pub struct Adb {
    runner: Arc<dyn CommandRunner>,
    program: String,
    serial: String,
    timeout: Duration,
}

impl Adb {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        serial: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            serial: serial.into(),
            timeout,
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        let mut all = vec!["-s", self.serial.as_str()];
        all.extend_from_slice(args);
        Invocation::new(self.program.as_str(), all).with_timeout(self.timeout)
    }

    /// Runs `adb -s <serial> <args>` without checking the exit status.
    pub async fn raw(&self, args: &[&str]) -> Result<CommandOutput, RobotError> {
        Ok(self.runner.run(&self.invocation(args)).await?)
    }

    /// Runs `adb -s <serial> <args>`, failing on a non-zero exit.
    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput, RobotError> {
        Ok(run_checked(self.runner.as_ref(), &self.invocation(args)).await?)
    }

    /// Runs a command in the device shell and returns its stdout.
    pub async fn shell(&self, args: &[&str]) -> Result<String, RobotError> {
        let mut all = vec!["shell"];
        all.extend_from_slice(args);
        Ok(self.run(&all).await?.stdout_str())
    }

    /// Runs a command through `exec-out` and returns raw stdout bytes.
    pub async fn exec_out(&self, args: &[&str]) -> Result<Vec<u8>, RobotError> {
        let mut all = vec!["exec-out"];
        all.extend_from_slice(args);
        Ok(self.run(&all).await?.stdout)
    }
}

/// Backslash-escapes characters the device shell would interpret.
pub fn escape_shell_text(text: &str) -> String {
    const SPECIAL: &str = "\\'\"`$&|;<>()[]{}*?~!# ";
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if SPECIAL.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
