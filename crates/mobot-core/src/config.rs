//! Persistent configuration for mobot.
//!
//! Stores user settings in `~/.mobot/config.json`: tool paths, agent and
//! tunnel ports, and the timeouts the Robots use. Every field has a default,
//! so a partial file (or none at all) is fine.
//!
//! # Example
//!
//! ```no_run
//! use mobot_core::config::MobotConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = MobotConfig::load();
//!
//! println!("agent port: {}", config.agent_port);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wait::WaitSettings;

const CONFIG_FILENAME: &str = "config.json";

/// Bundle identifier of the WebDriverAgent runner app.
pub const DEFAULT_AGENT_BUNDLE_ID: &str = "com.facebook.WebDriverAgentRunner.xctrunner";

/// Returns the mobot state directory (`~/.mobot`).
///
/// Falls back to `./.mobot` when no home directory can be determined.
pub fn mobot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mobot")
}

/// Persistent mobot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobotConfig {
    /// Path or name of the Android Debug Bridge binary.
    pub adb_path: String,
    /// Path or name of the go-ios `ios` binary.
    pub ios_path: String,
    /// Local port the WebDriverAgent listens on (forwarded for devices).
    pub agent_port: u16,
    /// Local port of the iOS 17+ tunnel agent.
    pub tunnel_port: u16,
    /// Bundle identifier of the agent app launched on simulators.
    pub agent_bundle_id: String,
    /// How long a simulator may take to bring the agent up.
    pub agent_startup_timeout_ms: u64,
    /// Upper bound on waiting for a session another caller is creating.
    pub connect_timeout_ms: u64,
    /// Duration of a swipe gesture on iOS.
    pub swipe_duration_ms: u64,
    /// Initial Wait Engine poll interval.
    pub wait_poll_interval_ms: u64,
    /// Cap on the Wait Engine poll interval.
    pub wait_max_poll_interval_ms: u64,
    /// Timeout for a single subprocess or agent request.
    pub command_timeout_ms: u64,
    /// Scroll budget for picker option selection.
    pub select_option_max_scrolls: u32,
}

impl Default for MobotConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            ios_path: "ios".to_string(),
            agent_port: 8100,
            tunnel_port: 60105,
            agent_bundle_id: DEFAULT_AGENT_BUNDLE_ID.to_string(),
            agent_startup_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            swipe_duration_ms: 300,
            wait_poll_interval_ms: 100,
            wait_max_poll_interval_ms: 1000,
            command_timeout_ms: 30_000,
            select_option_max_scrolls: 10,
        }
    }
}

impl MobotConfig {
    /// Load config from `~/.mobot/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&mobot_dir().join(CONFIG_FILENAME))
    }

    /// Load config from an explicit path, with the same fallback as
    /// [`load`](Self::load).
    pub fn load_from(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.mobot/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = mobot_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(dir.join(CONFIG_FILENAME), json)
    }

    pub fn agent_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_startup_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Wait Engine poll settings.
    pub fn wait_settings(&self) -> WaitSettings {
        WaitSettings {
            initial_interval: Duration::from_millis(self.wait_poll_interval_ms),
            max_interval: Duration::from_millis(self.wait_max_poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MobotConfig::default();
        assert_eq!(config.agent_port, 8100);
        assert_eq!(config.tunnel_port, 60105);
        assert_eq!(config.agent_bundle_id, DEFAULT_AGENT_BUNDLE_ID);
        assert_eq!(config.wait_settings(), WaitSettings::default());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let loaded: MobotConfig =
            serde_json::from_str(r#"{"adb_path": "/opt/android/adb", "agent_port": 8200}"#).unwrap();
        assert_eq!(loaded.adb_path, "/opt/android/adb");
        assert_eq!(loaded.agent_port, 8200);
        assert_eq!(loaded.tunnel_port, 60105);
        assert_eq!(loaded.swipe_duration(), Duration::from_millis(300));
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: MobotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, MobotConfig::default());
    }

    #[test]
    fn load_from_missing_or_malformed_file_falls_back() {
        let dir = std::env::temp_dir().join(format!("mobot-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        assert_eq!(MobotConfig::load_from(&dir.join("absent.json")), MobotConfig::default());

        let bad = dir.join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert_eq!(MobotConfig::load_from(&bad), MobotConfig::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
