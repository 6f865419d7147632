//! Robots backed by WebDriverAgent.
//!
//! Physical iOS devices and iOS Simulators both drive the same agent
//! protocol; they differ only in what has to be true before the agent can be
//! reached. [`AgentRobot`] owns the shared part (the memoized
//! [`WdaClient`], the element and screen-size caches) and delegates the
//! platform-specific part to an [`AgentHost`].
//!
//! The first call that needs the agent runs the host's precondition chain
//! and memoizes the client. Every later call reuses it without repeating the
//! chain. A failed chain is not memoized, so the next call tries again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::cache::Cached;
use crate::config::MobotConfig;
use crate::element::{
    Button, ElementSet, InstalledApp, Orientation, ScreenSize, SwipeDirection,
};
use crate::robot::{Platform, Robot, RobotError};
use crate::wait::WaitSettings;
use crate::wda_client::{WdaClient, WdaSettings};

/// Platform-specific preconditions and app management for an
/// [`AgentRobot`].
#[async_trait]
pub trait AgentHost: Send + Sync {
    fn platform(&self) -> Platform;

    fn device_id(&self) -> &str;

    /// Root URL of the agent as seen from this machine.
    fn agent_url(&self) -> String;

    /// Makes sure the agent is reachable through `client`.
    ///
    /// Called until it succeeds once; the client is memoized afterwards.
    async fn ensure_ready(&self, client: &WdaClient) -> Result<(), RobotError>;

    async fn list_apps(&self, client: &WdaClient) -> Result<Vec<InstalledApp>, RobotError>;

    async fn launch_app(&self, client: &WdaClient, app_id: &str) -> Result<(), RobotError> {
        client.launch_app(app_id).await
    }

    async fn terminate_app(&self, client: &WdaClient, app_id: &str) -> Result<(), RobotError> {
        client.terminate_app(app_id).await
    }

    async fn open_url(&self, client: &WdaClient, url: &str) -> Result<(), RobotError> {
        client.open_url(url).await
    }
}

/// A [`Robot`] that talks to WebDriverAgent through an [`AgentHost`].
pub struct AgentRobot<H> {
    host: H,
    wda: WdaSettings,
    client: OnceCell<WdaClient>,
    elements: Cached<ElementSet>,
    screen: Cached<ScreenSize>,
    wait_settings: WaitSettings,
    max_option_scrolls: u32,
}

impl<H: AgentHost> AgentRobot<H> {
    pub fn new(host: H, config: &MobotConfig) -> Self {
        Self {
            host,
            wda: WdaSettings::from_config(config),
            client: OnceCell::new(),
            elements: Cached::elements(),
            screen: Cached::until_invalidated(),
            wait_settings: config.wait_settings(),
            max_option_scrolls: config.select_option_max_scrolls,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// The memoized agent client, running the host's precondition chain on
    /// first use.
    pub async fn client(&self) -> Result<&WdaClient, RobotError> {
        self.client
            .get_or_try_init(|| async {
                let client = WdaClient::new(self.host.agent_url(), self.wda)?;
                self.host.ensure_ready(&client).await?;
                info!(device = self.host.device_id(), platform = %self.host.platform(), "agent ready");
                Ok::<_, RobotError>(client)
            })
            .await
    }

    /// Returns `true` once the precondition chain has succeeded.
    pub fn is_ready(&self) -> bool {
        self.client.initialized()
    }

    /// Clears the element cache and passes `result` through.
    async fn settle<T>(&self, result: Result<T, RobotError>) -> Result<T, RobotError> {
        self.elements.invalidate().await;
        result
    }
}

#[async_trait]
impl<H: AgentHost> Robot for AgentRobot<H> {
    fn platform(&self) -> Platform {
        self.host.platform()
    }

    fn device_id(&self) -> &str {
        self.host.device_id()
    }

    async fn screen_size(&self) -> Result<ScreenSize, RobotError> {
        if let Some(size) = self.screen.get().await {
            return Ok(size);
        }
        let size = self.client().await?.screen_size().await?;
        self.screen.put(size).await;
        Ok(size)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RobotError> {
        self.client().await?.screenshot().await
    }

    async fn elements_on_screen(&self) -> Result<ElementSet, RobotError> {
        if let Some(set) = self.elements.get().await {
            debug!("element cache hit");
            return Ok(set);
        }
        let fresh: ElementSet = Arc::from(self.client().await?.source_elements().await?);
        self.elements.put(fresh.clone()).await;
        Ok(fresh)
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), RobotError> {
        let result = async { self.client().await?.tap(x, y).await }.await;
        self.settle(result).await
    }

    async fn long_press(&self, x: i32, y: i32) -> Result<(), RobotError> {
        let result = async { self.client().await?.long_press(x, y).await }.await;
        self.settle(result).await
    }

    async fn swipe(&self, direction: SwipeDirection) -> Result<(), RobotError> {
        let result = async {
            let size = self.screen_size().await?;
            self.client().await?.swipe(size, direction).await
        }
        .await;
        self.settle(result).await
    }

    async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<(), RobotError> {
        let result = async {
            self.client()
                .await?
                .swipe_from(x, y, direction, distance)
                .await
        }
        .await;
        self.settle(result).await
    }

    async fn send_keys(&self, text: &str) -> Result<(), RobotError> {
        let result = async { self.client().await?.send_keys(text).await }.await;
        self.settle(result).await
    }

    async fn press_button(&self, button: Button) -> Result<(), RobotError> {
        let result = async { self.client().await?.press_button(button).await }.await;
        self.settle(result).await
    }

    async fn set_orientation(&self, orientation: Orientation) -> Result<(), RobotError> {
        self.screen.invalidate().await;
        let result = async { self.client().await?.set_orientation(orientation).await }.await;
        self.screen.invalidate().await;
        self.settle(result).await
    }

    async fn orientation(&self) -> Result<Orientation, RobotError> {
        self.client().await?.orientation().await
    }

    async fn clipboard(&self) -> Result<String, RobotError> {
        self.client().await?.clipboard().await
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), RobotError> {
        self.client().await?.set_clipboard(text).await
    }

    async fn clear_clipboard(&self) -> Result<(), RobotError> {
        self.client().await?.set_clipboard("").await
    }

    async fn hide_keyboard(&self) -> Result<(), RobotError> {
        let result = async { self.client().await?.dismiss_keyboard().await }.await;
        self.settle(result).await
    }

    async fn launch_app(&self, app_id: &str) -> Result<(), RobotError> {
        let result = async {
            let client = self.client().await?;
            self.host.launch_app(client, app_id).await
        }
        .await;
        self.settle(result).await
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), RobotError> {
        let result = async {
            let client = self.client().await?;
            self.host.terminate_app(client, app_id).await
        }
        .await;
        self.settle(result).await
    }

    async fn list_apps(&self) -> Result<Vec<InstalledApp>, RobotError> {
        let client = self.client().await?;
        self.host.list_apps(client).await
    }

    async fn open_url(&self, url: &str) -> Result<(), RobotError> {
        let result = async {
            let client = self.client().await?;
            self.host.open_url(client, url).await
        }
        .await;
        self.settle(result).await
    }

    fn wait_settings(&self) -> WaitSettings {
        self.wait_settings
    }

    fn max_option_scrolls(&self) -> u32 {
        self.max_option_scrolls
    }

    async fn dispose(&self) -> Result<(), RobotError> {
        if let Some(client) = self.client.get() {
            client.dispose().await;
        }
        self.elements.invalidate().await;
        self.screen.invalidate().await;
        Ok(())
    }
}
