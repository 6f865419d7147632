//! The device-control contract every platform implements.
//!
//! A [`Robot`] drives one device. Android, physical iOS and iOS Simulator
//! Robots all implement the same trait, so callers can tap, swipe, type and
//! inspect elements without knowing which transport sits underneath.
//!
//! Higher-level operations ([`Robot::wait_for`],
//! [`Robot::select_option_by_text`] and [`Robot::swipe_on_element`]) are
//! provided methods built on the primitives, so every platform shares the
//! same scroll-and-search behavior.
//!
//! Optional diagnostics are exposed as separate capability traits
//! ([`LogReader`], [`ProxyControl`]) that a Robot hands out through
//! [`Robot::log_reader`] and [`Robot::proxy_control`] when it supports them.
//!
//! # Example
//!
//! ```no_run
//! use mobot_core::element::{ElementSelector, SwipeDirection};
//! use mobot_core::robot::{Robot, RobotError};
//!
//! async fn open_settings(robot: &dyn Robot) -> Result<(), RobotError> {
//!     let elements = robot.elements_on_screen().await?;
//!     if let Some(settings) = ElementSelector::label("Settings").find(&elements) {
//!         let (x, y) = settings.center();
//!         robot.tap(x, y).await?;
//!     } else {
//!         robot.swipe(SwipeDirection::Up).await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::element::{
    Button, ElementSelector, ElementSet, InstalledApp, Orientation, ScreenSize, SwipeDirection,
};
use crate::shell::ShellError;
use crate::wait::{self, WaitCondition, WaitOutcome, WaitSettings};
use crate::wda_session::WdaError;

/// Default number of scrolls [`Robot::select_option_by_text`] performs
/// before giving up.
pub const DEFAULT_MAX_OPTION_SCROLLS: u32 = 10;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`Robot`] operations.
///
/// [`RobotError::Actionable`] carries a complete sentence telling the
/// operator how to fix the problem and is meant to be shown verbatim. Every
/// other variant is an opaque fault.
#[derive(Error, Debug)]
pub enum RobotError {
    /// A condition the caller can fix, with remediation text.
    #[error("{0}")]
    Actionable(String),

    /// An external command failed.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A response could not be parsed.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// A request to the automation agent failed.
    #[error("Agent request failed: {0}")]
    Wda(#[from] WdaError),

    /// An operation did not finish in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl RobotError {
    /// Returns `true` if the error carries operator-facing remediation text.
    pub fn is_actionable(&self) -> bool {
        matches!(self, RobotError::Actionable(_))
    }
}

impl From<ShellError> for RobotError {
    fn from(e: ShellError) -> Self {
        match e {
            ShellError::Timeout { .. } => RobotError::Timeout(e.to_string()),
            other => RobotError::CommandFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RobotError {
    fn from(e: serde_json::Error) -> Self {
        RobotError::JsonParse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Which transport a Robot drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Simulator,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
            Platform::Simulator => write!(f, "simulator"),
        }
    }
}

// ---------------------------------------------------------------------------
// Optional capabilities
// ---------------------------------------------------------------------------

/// Device log access.
///
/// Every method degrades to an explanatory string instead of failing, since
/// callers only want supplementary context.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// The last `lines` log lines written by the running app `package`.
    async fn app_logs(&self, package: &str, lines: usize) -> String;

    /// Crash reports, optionally restricted to one package.
    async fn crash_logs(&self, package: Option<&str>) -> String;

    /// The last `lines` error-level lines from the whole system log.
    async fn system_errors(&self, lines: usize) -> String;
}

/// Device-wide HTTP proxy settings.
///
/// Like [`LogReader`], failures come back as explanatory strings.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// The current proxy setting.
    async fn proxy(&self) -> String;

    /// Routes device HTTP traffic through `host:port`.
    async fn set_proxy(&self, host: &str, port: u16) -> String;

    /// Removes the proxy setting.
    async fn clear_proxy(&self) -> String;
}

// ---------------------------------------------------------------------------
// Robot trait
// ---------------------------------------------------------------------------

/// Common device-control surface for every platform.
///
/// Every mutating call clears the Robot's element cache before returning,
/// so a query issued afterwards never sees elements captured before the
/// mutation. Orientation changes additionally clear the screen-size cache.
#[async_trait]
pub trait Robot: Send + Sync {
    /// The platform this Robot drives.
    fn platform(&self) -> Platform;

    /// The device identifier this Robot is bound to.
    fn device_id(&self) -> &str;

    /// Screen dimensions, cached until the orientation changes.
    async fn screen_size(&self) -> Result<ScreenSize, RobotError>;

    /// A screenshot as encoded image bytes (PNG).
    async fn screenshot(&self) -> Result<Vec<u8>, RobotError>;

    /// The on-screen elements, served from cache while fresh.
    async fn elements_on_screen(&self) -> Result<ElementSet, RobotError>;

    /// Taps at a coordinate.
    async fn tap(&self, x: i32, y: i32) -> Result<(), RobotError>;

    /// Long-presses at a coordinate.
    async fn long_press(&self, x: i32, y: i32) -> Result<(), RobotError>;

    /// Swipes from the screen center in `direction`.
    async fn swipe(&self, direction: SwipeDirection) -> Result<(), RobotError>;

    /// Swipes from a coordinate in `direction`, travelling `distance` pixels
    /// (platform default when `None`).
    async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<(), RobotError>;

    /// Types text into the focused field.
    async fn send_keys(&self, text: &str) -> Result<(), RobotError>;

    /// Presses a hardware or soft button.
    async fn press_button(&self, button: Button) -> Result<(), RobotError>;

    /// Rotates the device.
    async fn set_orientation(&self, orientation: Orientation) -> Result<(), RobotError>;

    /// Current device orientation.
    async fn orientation(&self) -> Result<Orientation, RobotError>;

    /// Clipboard text.
    async fn clipboard(&self) -> Result<String, RobotError>;

    /// Replaces the clipboard text.
    async fn set_clipboard(&self, text: &str) -> Result<(), RobotError>;

    /// Empties the clipboard.
    async fn clear_clipboard(&self) -> Result<(), RobotError>;

    /// Dismisses the soft keyboard if it is shown.
    async fn hide_keyboard(&self) -> Result<(), RobotError>;

    /// Launches an app by package name or bundle identifier.
    async fn launch_app(&self, app_id: &str) -> Result<(), RobotError>;

    /// Terminates an app by package name or bundle identifier.
    async fn terminate_app(&self, app_id: &str) -> Result<(), RobotError>;

    /// Apps installed on the device.
    async fn list_apps(&self) -> Result<Vec<InstalledApp>, RobotError>;

    /// Opens a URL with the device's default handler.
    async fn open_url(&self, url: &str) -> Result<(), RobotError>;

    /// Poll interval settings used by [`wait_for`](Robot::wait_for).
    fn wait_settings(&self) -> WaitSettings {
        WaitSettings::default()
    }

    /// Scroll budget used by
    /// [`select_option_by_text`](Robot::select_option_by_text).
    fn max_option_scrolls(&self) -> u32 {
        DEFAULT_MAX_OPTION_SCROLLS
    }

    /// Waits for `condition` against this Robot's element list.
    ///
    /// Never fails; inspect [`WaitOutcome::success`].
    async fn wait_for(&self, condition: &WaitCondition) -> WaitOutcome {
        let settings = self.wait_settings();
        wait::wait_for(condition, &settings, || self.elements_on_screen()).await
    }

    /// Taps the element whose text, label or value equals `text`
    /// (case-insensitive), scrolling up to [`max_option_scrolls`] times to
    /// find it.
    ///
    /// [`max_option_scrolls`]: Robot::max_option_scrolls
    async fn select_option_by_text(&self, text: &str) -> Result<(), RobotError> {
        let max_scrolls = self.max_option_scrolls();
        for scroll in 0..=max_scrolls {
            let elements = self.elements_on_screen().await?;
            if let Some(option) = elements.iter().find(|e| e.shows_text(text)) {
                let (x, y) = option.center();
                debug!(text, scroll, x, y, "option found");
                return self.tap(x, y).await;
            }
            if scroll < max_scrolls {
                self.swipe(SwipeDirection::Up).await?;
            }
        }
        Err(RobotError::Actionable(format!(
            "Option \"{text}\" was not found after scrolling {max_scrolls} times. \
             Check the option text, or open the picker before selecting."
        )))
    }

    /// Swipes inside the bounds of the first element matching `selector`,
    /// for scrolling nested containers.
    async fn swipe_on_element(
        &self,
        selector: &ElementSelector,
        direction: SwipeDirection,
    ) -> Result<(), RobotError> {
        let elements = self.elements_on_screen().await?;
        let Some(element) = selector.find(&elements) else {
            return Err(RobotError::Actionable(format!(
                "No element matching {selector} is on screen. \
                 List the on-screen elements and pick a selector from them."
            )));
        };
        let (start, distance) = swipe_within(element.rect, direction);
        self.swipe_from_coordinate(start.0, start.1, direction, Some(distance))
            .await
    }

    /// Log access, when this Robot supports it.
    fn log_reader(&self) -> Option<&dyn LogReader> {
        None
    }

    /// Proxy control, when this Robot supports it.
    fn proxy_control(&self) -> Option<&dyn ProxyControl> {
        None
    }

    /// Releases remote resources held by the Robot. Best effort.
    async fn dispose(&self) -> Result<(), RobotError> {
        Ok(())
    }
}

/// Start point and travel distance for a swipe spanning 60% of `rect` along
/// the swipe axis.
fn swipe_within(
    rect: crate::element::Rect,
    direction: SwipeDirection,
) -> ((i32, i32), i32) {
    let extent = if direction.is_vertical() {
        rect.height
    } else {
        rect.width
    };
    let distance = crate::element::fraction(extent, 3, 5);
    let (cx, cy) = rect.center();
    (direction.offset(cx, cy, -distance / 2), distance)
}
