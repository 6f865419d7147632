//! WebDriverAgent HTTP client.
//!
//! [`WdaClient`] translates gestures and queries into WebDriverAgent
//! requests. Session-scoped calls ask the [`SessionManager`] for the session
//! URL on every call, so a session that was silently renewed is picked up
//! without the client noticing.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mobot_core::element::SwipeDirection;
//! use mobot_core::wda_client::{WdaClient, WdaSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WdaClient::new("http://localhost:8100", WdaSettings::default())?;
//! if client.is_running().await {
//!     client.tap(100, 200).await?;
//!     let size = client.screen_size().await?;
//!     client.swipe(size, SwipeDirection::Up).await?;
//!     let elements = client.source_elements().await?;
//!     println!("{} elements on screen", elements.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::MobotConfig;
use crate::element::{Button, Orientation, ScreenElement, ScreenSize, SwipeDirection};
use crate::robot::RobotError;
use crate::wda_protocol::{self, ActionsRequest, ScreenInfo, SourceNode};
use crate::wda_session::{agent_http_client, send_json, SessionManager, WdaError};

/// Distance of a coordinate-anchored swipe when the caller gives none.
pub const DEFAULT_SWIPE_DISTANCE: i32 = 400;

/// Timeouts and gesture timing for a [`WdaClient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WdaSettings {
    /// Upper bound on waiting for a session another caller is creating.
    pub connect_timeout: Duration,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
    /// How long the finger travels during a swipe.
    pub swipe_duration: Duration,
}

impl Default for WdaSettings {
    fn default() -> Self {
        Self::from_config(&MobotConfig::default())
    }
}

impl WdaSettings {
    pub fn from_config(config: &MobotConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.command_timeout(),
            swipe_duration: config.swipe_duration(),
        }
    }
}

/// Client for one WebDriverAgent instance.
#[derive(Debug)]
pub struct WdaClient {
    sessions: SessionManager,
    settings: WdaSettings,
}

impl WdaClient {
    /// Creates a client for the agent at `base_url`. No request is made.
    pub fn new(base_url: impl Into<String>, settings: WdaSettings) -> Result<Self, WdaError> {
        let http = agent_http_client(settings.request_timeout)?;
        Ok(Self {
            sessions: SessionManager::with_client(http, base_url, settings.connect_timeout),
            settings,
        })
    }

    /// The session manager backing this client.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.sessions.base_url(), path)
    }

    async fn session_post(&self, path: &str, body: &Value) -> Result<Value, RobotError> {
        let url = format!("{}{}", self.sessions.session_url().await?, path);
        let request = self.sessions.http().post(url).json(body);
        Ok(send_json(request, path).await?)
    }

    async fn session_get(&self, path: &str) -> Result<Value, RobotError> {
        let url = format!("{}{}", self.sessions.session_url().await?, path);
        Ok(send_json(self.sessions.http().get(url), path).await?)
    }

    async fn perform(&self, actions: &ActionsRequest) -> Result<(), RobotError> {
        let body = serde_json::to_value(actions)?;
        self.session_post("/actions", &body).await?;
        Ok(())
    }

    /// Clears the agent's pending pointer state after a swipe.
    async fn release_actions(&self) -> Result<(), RobotError> {
        let url = format!("{}/actions", self.sessions.session_url().await?);
        send_json(self.sessions.http().delete(url), "/actions").await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Returns `true` if `GET /status` answers 200 with `ready: true`.
    /// Never fails; any error counts as not running.
    pub async fn is_running(&self) -> bool {
        match send_json(self.sessions.http().get(self.url("/status")), "/status").await {
            Ok(body) => body
                .pointer("/value/ready")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                debug!(error = %e, "agent status probe failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Gestures
    // -----------------------------------------------------------------------

    #[instrument(skip(self), level = "debug")]
    pub async fn tap(&self, x: i32, y: i32) -> Result<(), RobotError> {
        self.perform(&ActionsRequest::tap(x, y)).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn long_press(&self, x: i32, y: i32) -> Result<(), RobotError> {
        self.perform(&ActionsRequest::long_press(x, y)).await
    }

    /// Swipes across 60% of a screen of `size`, centered on the midpoint.
    #[instrument(skip(self), level = "debug")]
    pub async fn swipe(&self, size: ScreenSize, direction: SwipeDirection) -> Result<(), RobotError> {
        let (from, to) = size.swipe_span(direction);
        self.perform_and_release(&ActionsRequest::swipe(from, to, self.settings.swipe_duration))
            .await
    }

    /// Swipes from `(x, y)` by `distance` (default 400) in `direction`.
    #[instrument(skip(self), level = "debug")]
    pub async fn swipe_from(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<(), RobotError> {
        let to = direction.offset(x, y, distance.unwrap_or(DEFAULT_SWIPE_DISTANCE));
        self.perform_and_release(&ActionsRequest::swipe((x, y), to, self.settings.swipe_duration))
            .await
    }

    /// Performs `actions`, then clears the input state whether or not the
    /// perform succeeded. The perform error wins when both fail.
    async fn perform_and_release(&self, actions: &ActionsRequest) -> Result<(), RobotError> {
        let performed = self.perform(actions).await;
        let released = self.release_actions().await;
        performed.and(released)
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), RobotError> {
        self.session_post("/wda/keys", &json!({ "value": [text] }))
            .await?;
        Ok(())
    }

    /// Presses a hardware button. iOS has HOME and the volume keys; ENTER is
    /// sent as a newline keystroke.
    pub async fn press_button(&self, button: Button) -> Result<(), RobotError> {
        let name = match button {
            Button::Home => "home",
            Button::VolumeUp => "volumeUp",
            Button::VolumeDown => "volumeDown",
            Button::Enter => return self.send_keys("\n").await,
            other => {
                return Err(RobotError::Actionable(format!(
                    "Button \"{other}\" is not supported on iOS. \
                     Supported buttons: HOME, VOLUME_UP, VOLUME_DOWN, ENTER."
                )))
            }
        };
        self.session_post("/wda/pressButton", &json!({ "name": name }))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Screen size in points, with the pixel scale factor.
    pub async fn screen_size(&self) -> Result<ScreenSize, RobotError> {
        let body = self.session_get("/wda/screen").await?;
        let info: ScreenInfo = serde_json::from_value(value_of(body)?)?;
        Ok(ScreenSize {
            width: info.screen_size.width.round() as i32,
            height: info.screen_size.height.round() as i32,
            scale: info.scale,
        })
    }

    /// PNG screenshot bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>, RobotError> {
        let body = send_json(self.sessions.http().get(self.url("/screenshot")), "/screenshot").await?;
        let encoded = value_of(body)?;
        let encoded = encoded
            .as_str()
            .ok_or_else(|| WdaError::InvalidResponse("screenshot value is not a string".into()))?;
        decode_base64(encoded)
    }

    /// The flattened UI tree.
    pub async fn source_elements(&self) -> Result<Vec<ScreenElement>, RobotError> {
        let body = send_json(
            self.sessions.http().get(self.url("/source/?format=json")),
            "/source",
        )
        .await?;
        let root: SourceNode = serde_json::from_value(value_of(body)?)?;
        Ok(wda_protocol::flatten(&root))
    }

    pub async fn orientation(&self) -> Result<Orientation, RobotError> {
        let body = self.session_get("/orientation").await?;
        let value = value_of(body)?;
        let wire = value
            .as_str()
            .ok_or_else(|| WdaError::InvalidResponse("orientation value is not a string".into()))?;
        wire.parse()
    }

    pub async fn set_orientation(&self, orientation: Orientation) -> Result<(), RobotError> {
        let wire = orientation.to_string().to_uppercase();
        self.session_post("/orientation", &json!({ "orientation": wire }))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Clipboard, keyboard, apps
    // -----------------------------------------------------------------------

    pub async fn clipboard(&self) -> Result<String, RobotError> {
        let body = self
            .session_post("/wda/getPasteboard", &json!({ "contentType": "plaintext" }))
            .await?;
        let encoded = value_of(body)?;
        let bytes = decode_base64(encoded.as_str().unwrap_or_default())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn set_clipboard(&self, text: &str) -> Result<(), RobotError> {
        let content = base64::engine::general_purpose::STANDARD.encode(text);
        self.session_post(
            "/wda/setPasteboard",
            &json!({ "content": content, "contentType": "plaintext" }),
        )
        .await?;
        Ok(())
    }

    pub async fn dismiss_keyboard(&self) -> Result<(), RobotError> {
        self.session_post("/wda/keyboard/dismiss", &json!({})).await?;
        Ok(())
    }

    pub async fn launch_app(&self, bundle_id: &str) -> Result<(), RobotError> {
        self.session_post("/wda/apps/launch", &json!({ "bundleId": bundle_id }))
            .await?;
        Ok(())
    }

    pub async fn terminate_app(&self, bundle_id: &str) -> Result<(), RobotError> {
        self.session_post("/wda/apps/terminate", &json!({ "bundleId": bundle_id }))
            .await?;
        Ok(())
    }

    pub async fn open_url(&self, url: &str) -> Result<(), RobotError> {
        self.session_post("/url", &json!({ "url": url })).await?;
        Ok(())
    }

    /// Ends the session. Best effort.
    pub async fn dispose(&self) {
        self.sessions.dispose().await;
    }
}

/// Unwraps the `{"value": ...}` envelope.
fn value_of(mut body: Value) -> Result<Value, WdaError> {
    match body.get_mut("value") {
        Some(value) => Ok(value.take()),
        None => Err(WdaError::InvalidResponse(
            "response has no \"value\" field".into(),
        )),
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, RobotError> {
    // The agent may wrap long payloads.
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| WdaError::Decode(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_envelope_is_required() {
        assert_eq!(value_of(json!({"value": 3})).unwrap(), json!(3));
        assert!(value_of(json!({"sessionId": "x"})).is_err());
    }

    #[test]
    fn base64_tolerates_line_breaks() {
        assert_eq!(decode_base64("aGVs\nbG8=").unwrap(), b"hello");
        assert!(decode_base64("!!!").is_err());
    }

    #[test]
    fn settings_follow_config() {
        let config = MobotConfig {
            swipe_duration_ms: 750,
            ..MobotConfig::default()
        };
        assert_eq!(
            WdaSettings::from_config(&config).swipe_duration,
            Duration::from_millis(750)
        );
    }
}
