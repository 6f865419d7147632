//! Android diagnostics: logcat access and proxy settings.
//!
//! [`AndroidDiagnostics`] implements the optional [`LogReader`] and
//! [`ProxyControl`] capabilities for Android Robots. Every operation returns
//! an explanatory string, including on failure.

use async_trait::async_trait;
use tracing::debug;

use crate::adb::Adb;
use crate::robot::{LogReader, ProxyControl};

/// Log-level column values kept by [`filter_error_lines`].
const ERROR_LEVELS: [&str; 2] = ["E", "F"];

/// Log and proxy access for one Android device.
#[derive(Clone)]
pub struct AndroidDiagnostics {
    adb: Adb,
}

impl AndroidDiagnostics {
    pub fn new(adb: Adb) -> Self {
        Self { adb }
    }

    async fn pid_of(&self, package: &str) -> Option<String> {
        let out = self.adb.shell(&["pidof", "-s", package]).await.ok()?;
        let pid = out.trim();
        (!pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit())).then(|| pid.to_string())
    }
}

#[async_trait]
impl LogReader for AndroidDiagnostics {
    async fn app_logs(&self, package: &str, lines: usize) -> String {
        let Some(pid) = self.pid_of(package).await else {
            return format!("{package} is not running, so it has no live logs. Launch the app first.");
        };
        let pid_arg = format!("--pid={pid}");
        let tail = lines.to_string();
        match self
            .adb
            .shell(&["logcat", "-d", pid_arg.as_str(), "-t", tail.as_str()])
            .await
        {
            Ok(text) if text.trim().is_empty() => format!("No log lines found for {package}."),
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "logcat failed");
                format!("Could not read logs for {package}: {e}")
            }
        }
    }

    async fn crash_logs(&self, package: Option<&str>) -> String {
        match self.adb.shell(&["logcat", "-d", "-b", "crash"]).await {
            Ok(text) => {
                let blocks = extract_crash_blocks(&text, package);
                if blocks.is_empty() {
                    match package {
                        Some(p) => format!("No crashes found for {p}."),
                        None => "No crashes found.".to_string(),
                    }
                } else {
                    blocks.join("\n\n")
                }
            }
            Err(e) => format!("Could not read the crash buffer: {e}"),
        }
    }

    async fn system_errors(&self, lines: usize) -> String {
        let tail = lines.to_string();
        match self
            .adb
            .shell(&["logcat", "-d", "-t", tail.as_str(), "*:E"])
            .await
        {
            Ok(text) => {
                let errors = filter_error_lines(&text);
                if errors.is_empty() {
                    "No system errors found.".to_string()
                } else {
                    errors.join("\n")
                }
            }
            Err(e) => format!("Could not read system logs: {e}"),
        }
    }
}

#[async_trait]
impl ProxyControl for AndroidDiagnostics {
    async fn proxy(&self) -> String {
        match self.adb.shell(&["settings", "get", "global", "http_proxy"]).await {
            Ok(value) => match value.trim() {
                "" | "null" | ":0" => "No proxy configured.".to_string(),
                proxy => format!("HTTP proxy: {proxy}"),
            },
            Err(e) => format!("Could not read the proxy setting: {e}"),
        }
    }

    async fn set_proxy(&self, host: &str, port: u16) -> String {
        let value = format!("{host}:{port}");
        match self
            .adb
            .shell(&["settings", "put", "global", "http_proxy", value.as_str()])
            .await
        {
            Ok(_) => format!("HTTP proxy set to {value}."),
            Err(e) => format!("Could not set the proxy: {e}"),
        }
    }

    async fn clear_proxy(&self) -> String {
        match self
            .adb
            .shell(&["settings", "put", "global", "http_proxy", ":0"])
            .await
        {
            Ok(_) => "HTTP proxy cleared.".to_string(),
            Err(e) => format!("Could not clear the proxy: {e}"),
        }
    }
}

fn starts_crash(line: &str) -> bool {
    line.contains("FATAL EXCEPTION") || line.contains("*** *** ***")
}

/// Splits crash-buffer text into one block per crash, keeping only blocks
/// that mention `package` when one is given.
pub fn extract_crash_blocks(text: &str, package: Option<&str>) -> Vec<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        if line.starts_with("--------- beginning of") {
            continue;
        }
        if starts_crash(line) {
            blocks.push(vec![line]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }
    blocks
        .into_iter()
        .map(|lines| lines.join("\n"))
        .filter(|block| package.map_or(true, |p| block.contains(p)))
        .collect()
}

/// Keeps `threadtime`-format lines whose level column is E or F.
pub fn filter_error_lines(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| {
            line.split_whitespace()
                .nth(4)
                .is_some_and(|level| ERROR_LEVELS.contains(&level))
        })
        .collect()
}
