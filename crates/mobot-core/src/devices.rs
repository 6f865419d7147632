//! Device discovery and Robot construction.
//!
//! Each platform has a [`DeviceManager`] that lists devices by shelling out
//! to the vendor tool (`adb`, go-ios `ios`, `xcrun simctl`) and builds a
//! Robot for a device it knows about. [`DeviceRegistry`] fans out over all
//! of them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent_robot::AgentRobot;
use crate::android_robot::AndroidRobot;
use crate::config::MobotConfig;
use crate::ios_device::{parse_json_output, IosDeviceHost};
use crate::robot::{Platform, Robot, RobotError};
use crate::shell::{run_checked, CommandRunner, Invocation, TokioRunner};
use crate::simctl::Simctl;
use crate::simulator::SimulatorHost;

/// Form factor of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Mobile,
    Tv,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Mobile => write!(f, "mobile"),
            DeviceKind::Tv => write!(f, "tv"),
        }
    }
}

/// A device as reported by its platform tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub kind: DeviceKind,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
}

/// Lists the devices of one platform and builds Robots for them.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    fn platform(&self) -> Platform;

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, RobotError>;

    /// A Robot bound to `id`, without checking that the device is present.
    fn robot_unchecked(&self, id: &str) -> Box<dyn Robot>;

    /// A Robot bound to `id`, failing actionably if the device is not listed.
    async fn robot(&self, id: &str) -> Result<Box<dyn Robot>, RobotError> {
        let devices = self.list_devices().await?;
        if devices.iter().any(|d| d.id == id) {
            return Ok(self.robot_unchecked(id));
        }
        let known: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        Err(RobotError::Actionable(format!(
            "No {} device with id \"{id}\" is available. Available devices: {}.",
            self.platform(),
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        )))
    }
}

// ---------------------------------------------------------------------------
// Android
// ---------------------------------------------------------------------------

/// Devices visible to `adb`.
pub struct AndroidDeviceManager {
    runner: Arc<dyn CommandRunner>,
    config: MobotConfig,
}

impl AndroidDeviceManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: MobotConfig) -> Self {
        Self { runner, config }
    }

    async fn adb(&self, args: &[&str]) -> Result<String, RobotError> {
        let invocation = Invocation::new(self.config.adb_path.as_str(), args.iter().copied())
            .with_timeout(self.config.command_timeout());
        Ok(run_checked(self.runner.as_ref(), &invocation).await?.stdout_str())
    }

    async fn getprop(&self, serial: &str, prop: &str) -> Option<String> {
        match self.adb(&["-s", serial, "shell", "getprop", prop]).await {
            Ok(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) => {
                debug!(serial, prop, error = %e, "getprop failed");
                None
            }
        }
    }
}

#[async_trait]
impl DeviceManager for AndroidDeviceManager {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, RobotError> {
        let out = self.adb(&["devices", "-l"]).await?;
        let mut devices = parse_adb_devices(&out);
        for device in devices.iter_mut().filter(|d| d.state == "device") {
            if self
                .getprop(&device.id, "ro.build.characteristics")
                .await
                .is_some_and(|c| c.split(',').any(|part| part.trim() == "tv"))
            {
                device.kind = DeviceKind::Tv;
            }
            device.os_version = self.getprop(&device.id, "ro.build.version.release").await;
        }
        Ok(devices)
    }

    fn robot_unchecked(&self, id: &str) -> Box<dyn Robot> {
        Box::new(AndroidRobot::new(id, self.runner.clone(), &self.config))
    }
}

/// Parses `adb devices -l`.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of devices") && !l.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            let model = fields
                .find_map(|f| f.strip_prefix("model:"))
                .map(|m| m.replace('_', " "));
            Some(DeviceInfo {
                id: serial.to_string(),
                name: model.unwrap_or_else(|| serial.to_string()),
                platform: Platform::Android,
                kind: DeviceKind::Mobile,
                state: state.to_string(),
                os_version: None,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Physical iOS
// ---------------------------------------------------------------------------

/// Physical iOS devices visible to go-ios.
pub struct IosDeviceManager {
    runner: Arc<dyn CommandRunner>,
    config: MobotConfig,
}

impl IosDeviceManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: MobotConfig) -> Self {
        Self { runner, config }
    }
}

#[derive(Debug, Deserialize)]
struct GoIosList {
    #[serde(rename = "deviceList", default)]
    devices: Vec<GoIosDevice>,
}

#[derive(Debug, Deserialize)]
struct GoIosDevice {
    #[serde(rename = "Udid")]
    udid: String,
    #[serde(rename = "DeviceName", default)]
    device_name: Option<String>,
    #[serde(rename = "ProductType", default)]
    product_type: Option<String>,
    #[serde(rename = "ProductVersion", default)]
    product_version: Option<String>,
}

#[async_trait]
impl DeviceManager for IosDeviceManager {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, RobotError> {
        let invocation = Invocation::new(self.config.ios_path.as_str(), ["list", "--details"])
            .with_timeout(self.config.command_timeout());
        let out = run_checked(self.runner.as_ref(), &invocation).await?;
        parse_go_ios_list(&out.stdout_str())
    }

    fn robot_unchecked(&self, id: &str) -> Box<dyn Robot> {
        let host = IosDeviceHost::new(id, self.runner.clone(), &self.config);
        Box::new(AgentRobot::new(host, &self.config))
    }
}

/// Parses `ios list --details`.
pub fn parse_go_ios_list(output: &str) -> Result<Vec<DeviceInfo>, RobotError> {
    let list: GoIosList = parse_json_output(output)?;
    Ok(list
        .devices
        .into_iter()
        .map(|d| {
            let kind = if d
                .product_type
                .as_deref()
                .is_some_and(|t| t.starts_with("AppleTV"))
            {
                DeviceKind::Tv
            } else {
                DeviceKind::Mobile
            };
            DeviceInfo {
                name: d
                    .device_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| d.udid.clone()),
                id: d.udid,
                platform: Platform::Ios,
                kind,
                state: "connected".to_string(),
                os_version: d.product_version,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Simulators
// ---------------------------------------------------------------------------

/// Booted iOS Simulators.
pub struct SimulatorManager {
    runner: Arc<dyn CommandRunner>,
    simctl: Simctl,
    config: MobotConfig,
}

impl SimulatorManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: MobotConfig) -> Self {
        Self {
            simctl: Simctl::new(runner.clone(), config.command_timeout()),
            runner,
            config,
        }
    }
}

#[async_trait]
impl DeviceManager for SimulatorManager {
    fn platform(&self) -> Platform {
        Platform::Simulator
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, RobotError> {
        Ok(self
            .simctl
            .list_devices()
            .await?
            .into_iter()
            .filter(|d| d.is_booted())
            .map(|d| DeviceInfo {
                kind: if d.is_tv() {
                    DeviceKind::Tv
                } else {
                    DeviceKind::Mobile
                },
                os_version: d.os_version(),
                platform: Platform::Simulator,
                id: d.udid,
                name: d.name,
                state: d.state,
            })
            .collect())
    }

    fn robot_unchecked(&self, id: &str) -> Box<dyn Robot> {
        let host = SimulatorHost::new(id, self.runner.clone(), &self.config);
        Box::new(AgentRobot::new(host, &self.config))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All platform managers behind one lookup.
pub struct DeviceRegistry {
    managers: Vec<Box<dyn DeviceManager>>,
}

impl DeviceRegistry {
    pub fn new(managers: Vec<Box<dyn DeviceManager>>) -> Self {
        Self { managers }
    }

    /// Managers for every platform, spawning real processes.
    pub fn with_defaults(config: &MobotConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioRunner);
        Self::new(vec![
            Box::new(AndroidDeviceManager::new(runner.clone(), config.clone())),
            Box::new(IosDeviceManager::new(runner.clone(), config.clone())),
            Box::new(SimulatorManager::new(runner, config.clone())),
        ])
    }

    /// Devices across all platforms. A platform whose tool is missing or
    /// failing contributes nothing.
    pub async fn list_all(&self) -> Vec<DeviceInfo> {
        let mut all = Vec::new();
        for manager in &self.managers {
            match manager.list_devices().await {
                Ok(devices) => all.extend(devices),
                Err(e) => warn!(platform = %manager.platform(), error = %e, "device listing failed"),
            }
        }
        all
    }

    /// A Robot for `id` from whichever platform lists it.
    pub async fn robot(&self, id: &str) -> Result<Box<dyn Robot>, RobotError> {
        for manager in &self.managers {
            match manager.list_devices().await {
                Ok(devices) if devices.iter().any(|d| d.id == id) => {
                    debug!(id, platform = %manager.platform(), "device resolved");
                    return Ok(manager.robot_unchecked(id));
                }
                Ok(_) => {}
                Err(e) => debug!(platform = %manager.platform(), error = %e, "device listing failed"),
            }
        }
        Err(RobotError::Actionable(format!(
            "Device \"{id}\" was not found on any platform. \
             List the available devices and pass one of their ids."
        )))
    }
}
