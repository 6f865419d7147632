//! Physical iOS devices.
//!
//! A physical device is reached through go-ios (`ios`): the agent's port is
//! forwarded to this machine, and iOS 17 and later additionally need the
//! go-ios tunnel. [`IosDeviceHost`] checks each of those preconditions in
//! order and fails with a message naming the stage that is missing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::{debug, debug_span, Instrument};

use crate::agent_robot::{AgentHost, AgentRobot};
use crate::config::MobotConfig;
use crate::element::InstalledApp;
use crate::robot::{Platform, RobotError};
use crate::shell::{run_checked, CommandRunner, Invocation};
use crate::wda_client::WdaClient;

/// Robot for a physical iOS device.
pub type IosRobot = AgentRobot<IosDeviceHost>;

/// First iOS major version that needs the tunnel.
pub const TUNNEL_MIN_MAJOR_VERSION: u32 = 17;

/// How long a local port probe may take.
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Host half of an [`IosRobot`].
pub struct IosDeviceHost {
    udid: String,
    runner: Arc<dyn CommandRunner>,
    ios_path: String,
    agent_port: u16,
    tunnel_port: u16,
    command_timeout: Duration,
}

impl IosDeviceHost {
    pub fn new(udid: impl Into<String>, runner: Arc<dyn CommandRunner>, config: &MobotConfig) -> Self {
        Self {
            udid: udid.into(),
            runner,
            ios_path: config.ios_path.clone(),
            agent_port: config.agent_port,
            tunnel_port: config.tunnel_port,
            command_timeout: config.command_timeout(),
        }
    }

    async fn go_ios(&self, args: &[&str]) -> Result<String, RobotError> {
        let mut all: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        all.push(format!("--udid={}", self.udid));
        let invocation = Invocation::new(&self.ios_path, all).with_timeout(self.command_timeout);
        let output = run_checked(self.runner.as_ref(), &invocation).await?;
        Ok(output.stdout_str())
    }

    /// The device's iOS version string, e.g. `17.2.1`.
    pub async fn product_version(&self) -> Result<String, RobotError> {
        let stdout = self.go_ios(&["info"]).await.map_err(|e| {
            RobotError::Actionable(format!(
                "Could not read device info for {} with go-ios: {e}. \
                 Make sure the device is connected and go-ios is installed (npm install -g go-ios).",
                self.udid
            ))
        })?;
        let info: DeviceInfoOutput = parse_json_output(&stdout)?;
        Ok(info.product_version)
    }

    /// Returns `true` when this device's iOS version needs the tunnel.
    pub async fn tunnel_required(&self) -> Result<bool, RobotError> {
        let version = self.product_version().await?;
        Ok(major_version(&version).is_some_and(|major| major >= TUNNEL_MIN_MAJOR_VERSION))
    }
}

#[async_trait]
impl AgentHost for IosDeviceHost {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn device_id(&self) -> &str {
        &self.udid
    }

    fn agent_url(&self) -> String {
        format!("http://localhost:{}", self.agent_port)
    }

    async fn ensure_ready(&self, client: &WdaClient) -> Result<(), RobotError> {
        let span = debug_span!("ios_preconditions", udid = %self.udid);
        async {
            if self.tunnel_required().await? && !port_open(self.tunnel_port, PORT_PROBE_TIMEOUT).await {
                return Err(RobotError::Actionable(format!(
                    "iOS 17 and later need the go-ios tunnel, but nothing is listening on port {}. \
                     Start it with \"ios tunnel start --userspace\" and retry.",
                    self.tunnel_port
                )));
            }
            debug!("tunnel check passed");

            if !port_open(self.agent_port, PORT_PROBE_TIMEOUT).await {
                return Err(RobotError::Actionable(format!(
                    "Port forwarding to WebDriverAgent is not running: nothing is listening on port {}. \
                     Start it with \"ios forward {} 8100 --udid={}\" and retry.",
                    self.agent_port, self.agent_port, self.udid
                )));
            }
            debug!("port forward check passed");

            if !client.is_running().await {
                return Err(RobotError::Actionable(format!(
                    "WebDriverAgent is not running on device {}. \
                     Launch it with \"ios runwda --udid={}\" and retry.",
                    self.udid, self.udid
                )));
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn list_apps(&self, _client: &WdaClient) -> Result<Vec<InstalledApp>, RobotError> {
        let stdout = self.go_ios(&["apps"]).await?;
        let apps: Vec<AppEntry> = parse_json_output(&stdout)?;
        Ok(apps
            .into_iter()
            .map(|app| InstalledApp {
                name: app.display_name.or(app.name).filter(|n| !n.is_empty()),
                id: app.bundle_id,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct DeviceInfoOutput {
    #[serde(rename = "ProductVersion")]
    product_version: String,
}

#[derive(Debug, Deserialize)]
struct AppEntry {
    #[serde(rename = "CFBundleIdentifier")]
    bundle_id: String,
    #[serde(rename = "CFBundleDisplayName", default)]
    display_name: Option<String>,
    #[serde(rename = "CFBundleName", default)]
    name: Option<String>,
}

/// Parses go-ios output, which may interleave log lines with the JSON
/// document.
pub(crate) fn parse_json_output<T: DeserializeOwned>(stdout: &str) -> Result<T, RobotError> {
    let trimmed = stdout.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(whole) => trimmed
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{') || line.starts_with('['))
            .find_map(|line| serde_json::from_str(line).ok())
            .ok_or_else(|| RobotError::JsonParse(whole.to_string())),
    }
}

/// Major component of a dotted version string.
pub fn major_version(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.parse().ok()
}

/// Returns `true` if something accepts TCP connections on `localhost:port`.
pub async fn port_open(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_parsing() {
        assert_eq!(major_version("17.2.1"), Some(17));
        assert_eq!(major_version("16.7"), Some(16));
        assert_eq!(major_version("18"), Some(18));
        assert_eq!(major_version(""), None);
        assert_eq!(major_version("beta"), None);
    }

    #[test]
    fn json_output_with_log_noise() {
        let stdout = "time=\"2024\" level=info msg=\"connecting\"\n{\"ProductVersion\":\"17.4\"}\n";
        let info: DeviceInfoOutput = parse_json_output(stdout).unwrap();
        assert_eq!(info.product_version, "17.4");
    }

    #[test]
    fn json_output_failure_is_parse_error() {
        let err = parse_json_output::<DeviceInfoOutput>("no json here").unwrap_err();
        assert!(matches!(err, RobotError::JsonParse(_)));
    }

    #[tokio::test]
    async fn port_probe_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_open(port, Duration::from_secs(1)).await);
        drop(listener);
    }
}
