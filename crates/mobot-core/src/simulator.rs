//! iOS Simulators.
//!
//! A simulator shares the host's network, so the agent is reached directly
//! on localhost. If the agent is not answering yet, [`SimulatorHost`]
//! launches the installed agent app through simctl and waits for it to come
//! up. The start-up poll itself is silent; if the agent is still down once it
//! ends, the precondition chain fails with an actionable error and is retried
//! on the next call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent_robot::{AgentHost, AgentRobot};
use crate::backoff::BackoffPolicy;
use crate::config::MobotConfig;
use crate::element::InstalledApp;
use crate::robot::{Platform, RobotError};
use crate::shell::CommandRunner;
use crate::simctl::Simctl;
use crate::wda_client::WdaClient;

/// Robot for an iOS Simulator.
pub type SimulatorRobot = AgentRobot<SimulatorHost>;

/// Interval between agent status probes while it starts.
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Host half of a [`SimulatorRobot`].
pub struct SimulatorHost {
    udid: String,
    simctl: Simctl,
    agent_port: u16,
    agent_bundle_id: String,
    startup_timeout: Duration,
}

impl SimulatorHost {
    pub fn new(udid: impl Into<String>, runner: Arc<dyn CommandRunner>, config: &MobotConfig) -> Self {
        Self {
            udid: udid.into(),
            simctl: Simctl::new(runner, config.command_timeout()),
            agent_port: config.agent_port,
            agent_bundle_id: config.agent_bundle_id.clone(),
            startup_timeout: config.agent_startup_timeout(),
        }
    }

    /// Launches the agent app if it is installed and polls until it reports
    /// ready or the start-up window closes.
    async fn start_agent(&self, client: &WdaClient) {
        match self.simctl.app_installed(&self.udid, &self.agent_bundle_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(bundle = %self.agent_bundle_id, "agent app not installed, skipping launch");
                return;
            }
            Err(e) => {
                debug!(error = %e, "could not query agent app container");
                return;
            }
        }

        if let Err(e) = self.simctl.launch(&self.udid, &self.agent_bundle_id).await {
            warn!(error = %e, "failed to launch agent app");
            return;
        }
        info!(udid = %self.udid, "launched agent, waiting for it to become ready");

        let deadline = Instant::now() + self.startup_timeout;
        let mut delays = BackoffPolicy::fixed(STARTUP_POLL_INTERVAL).delays();
        while Instant::now() < deadline {
            if client.is_running().await {
                info!(udid = %self.udid, "agent is ready");
                return;
            }
            let delay = delays.next().unwrap_or(STARTUP_POLL_INTERVAL);
            tokio::time::sleep(delay).await;
        }
        warn!(
            udid = %self.udid,
            timeout_ms = self.startup_timeout.as_millis() as u64,
            "agent did not become ready in time"
        );
    }
}

#[async_trait]
impl AgentHost for SimulatorHost {
    fn platform(&self) -> Platform {
        Platform::Simulator
    }

    fn device_id(&self) -> &str {
        &self.udid
    }

    fn agent_url(&self) -> String {
        format!("http://localhost:{}", self.agent_port)
    }

    async fn ensure_ready(&self, client: &WdaClient) -> Result<(), RobotError> {
        if client.is_running().await {
            return Ok(());
        }
        self.start_agent(client).await;
        if client.is_running().await {
            return Ok(());
        }
        Err(RobotError::Actionable(format!(
            "WebDriverAgent is not running on simulator {udid} (expected at {url}). \
             Install the agent app ({bundle}) on the simulator, or start it with \
             `xcodebuild test-without-building` against the WebDriverAgentRunner scheme, \
             then try again.",
            udid = self.udid,
            url = self.agent_url(),
            bundle = self.agent_bundle_id,
        )))
    }

    async fn list_apps(&self, _client: &WdaClient) -> Result<Vec<InstalledApp>, RobotError> {
        self.simctl.list_apps(&self.udid).await
    }

    async fn launch_app(&self, _client: &WdaClient, app_id: &str) -> Result<(), RobotError> {
        self.simctl.launch(&self.udid, app_id).await
    }

    async fn terminate_app(&self, _client: &WdaClient, app_id: &str) -> Result<(), RobotError> {
        self.simctl.terminate(&self.udid, app_id).await
    }

    async fn open_url(&self, _client: &WdaClient, url: &str) -> Result<(), RobotError> {
        self.simctl.open_url(&self.udid, url).await
    }
}
