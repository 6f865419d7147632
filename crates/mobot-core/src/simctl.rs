//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! This module wraps the simulator control commands the Simulator Robot and
//! the device manager need: device listing, app queries and launches, and
//! URL opening. Every command goes through a [`CommandRunner`], so tests can
//! script simctl's output.
//!
//! # Requirements
//!
//! Xcode must be installed for `xcrun simctl` to be available.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mobot_core::shell::TokioRunner;
//! use mobot_core::simctl::Simctl;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let simctl = Simctl::new(Arc::new(TokioRunner), Duration::from_secs(30));
//! for device in simctl.list_devices().await? {
//!     println!("{}: {} ({})", device.name, device.udid, device.state);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::element::InstalledApp;
use crate::robot::RobotError;
use crate::shell::{run_checked, CommandOutput, CommandRunner, Invocation};

/// An iOS Simulator as reported by `xcrun simctl list devices -j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorDevice {
    /// The unique device identifier (UDID) for this simulator.
    pub udid: String,

    /// The human-readable name of the device (e.g., "iPhone 15 Pro").
    pub name: String,

    /// The current state of the device (e.g., "Booted", "Shutdown").
    pub state: String,

    /// The device type identifier (e.g., "com.apple.CoreSimulator.SimDeviceType.iPhone-15-Pro").
    #[serde(rename = "deviceTypeIdentifier")]
    pub device_type: Option<String>,

    /// The runtime key this device was listed under, filled in after parsing.
    #[serde(skip_deserializing)]
    pub runtime: String,
}

impl SimulatorDevice {
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }

    /// OS version derived from the runtime key, e.g. `17.0` from
    /// `com.apple.CoreSimulator.SimRuntime.iOS-17-0`.
    pub fn os_version(&self) -> Option<String> {
        let suffix = self.runtime.rsplit('.').next()?;
        let (_, version) = suffix.split_once('-')?;
        Some(version.replace('-', "."))
    }

    /// Returns `true` for Apple TV simulators.
    pub fn is_tv(&self) -> bool {
        self.runtime.contains("tvOS")
            || self
                .device_type
                .as_deref()
                .is_some_and(|t| t.contains("Apple-TV"))
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: HashMap<String, Vec<SimulatorDevice>>,
}

/// Async wrapper for `xcrun simctl`.
#[derive(Clone)]
pub struct Simctl {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl Simctl {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        let mut all = vec!["simctl"];
        all.extend_from_slice(args);
        Invocation::new("xcrun", all).with_timeout(self.timeout)
    }

    async fn checked(&self, args: &[&str]) -> Result<CommandOutput, RobotError> {
        Ok(run_checked(self.runner.as_ref(), &self.invocation(args)).await?)
    }

    /// Lists all simulators across every runtime.
    pub async fn list_devices(&self) -> Result<Vec<SimulatorDevice>, RobotError> {
        let output = self.checked(&["list", "devices", "-j"]).await?;
        parse_device_list(&output.stdout)
    }

    /// Returns `true` if `bundle_id` is installed on the simulator.
    pub async fn app_installed(&self, udid: &str, bundle_id: &str) -> Result<bool, RobotError> {
        let output = self
            .runner
            .run(&self.invocation(&["get_app_container", udid, bundle_id]))
            .await?;
        Ok(output.success)
    }

    pub async fn launch(&self, udid: &str, bundle_id: &str) -> Result<(), RobotError> {
        self.checked(&["launch", udid, bundle_id]).await?;
        Ok(())
    }

    pub async fn terminate(&self, udid: &str, bundle_id: &str) -> Result<(), RobotError> {
        self.checked(&["terminate", udid, bundle_id]).await?;
        Ok(())
    }

    pub async fn open_url(&self, udid: &str, url: &str) -> Result<(), RobotError> {
        self.checked(&["openurl", udid, url]).await?;
        Ok(())
    }

    /// Installed apps, parsed from the plist-style `listapps` output.
    pub async fn list_apps(&self, udid: &str) -> Result<Vec<InstalledApp>, RobotError> {
        let output = self.checked(&["listapps", udid]).await?;
        Ok(parse_app_list(&output.stdout_str()))
    }
}

/// Parses `simctl list devices -j` output into a flat device list.
pub fn parse_device_list(json: &[u8]) -> Result<Vec<SimulatorDevice>, RobotError> {
    let device_list: DeviceList = serde_json::from_slice(json)?;
    let mut devices: Vec<SimulatorDevice> = device_list
        .devices
        .into_iter()
        .flat_map(|(runtime, devices)| {
            devices.into_iter().map(move |mut d| {
                d.runtime = runtime.clone();
                d
            })
        })
        .collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.udid.cmp(&b.udid)));
    Ok(devices)
}

fn entry_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*"?([^"=\s]+)"?\s*=\s*\{"#).expect("entry regex must compile"))
}

fn entry_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z]+)\s*=\s*"?([^";]*)"?;\s*$"#).expect("field regex must compile")
    })
}

/// Parses the OpenStep plist printed by `simctl listapps`.
///
/// Only top-level app entries and their direct `CFBundleIdentifier` /
/// `CFBundleDisplayName` fields are read; nested dictionaries are skipped.
pub fn parse_app_list(plist: &str) -> Vec<InstalledApp> {
    let mut apps = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<(String, Option<String>, Option<String>)> = None;

    for line in plist.lines() {
        let opens = line.matches('{').count();
        let closes = line.matches('}').count();

        if depth == 1 && opens > 0 {
            if let Some(caps) = entry_start().captures(line) {
                current = Some((caps[1].to_string(), None, None));
            }
        } else if depth == 2 && opens == 0 && closes == 0 {
            if let (Some(caps), Some(entry)) = (entry_field().captures(line), current.as_mut()) {
                match &caps[1] {
                    "CFBundleIdentifier" => entry.1 = Some(caps[2].to_string()),
                    "CFBundleDisplayName" => entry.2 = Some(caps[2].to_string()),
                    _ => {}
                }
            }
        }

        depth = (depth + opens).saturating_sub(closes);
        if depth <= 1 && closes > 0 {
            if let Some((key, id, name)) = current.take() {
                apps.push(InstalledApp {
                    id: id.unwrap_or(key),
                    name: name.filter(|n| !n.is_empty()),
                });
            }
        }
    }
    apps
}
