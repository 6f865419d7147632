//! # mobot-core
//!
//! Device-control layer for Android devices, physical iOS devices and iOS
//! Simulators.
//!
//! Every platform implements the [`robot::Robot`] trait, so a caller can tap,
//! swipe, type, read the on-screen elements and take screenshots without
//! knowing which transport sits underneath.
//!
//! ## Modules
//!
//! - [`robot`] - The Robot contract, its error type and optional capabilities
//! - [`element`] - Elements, selectors, screen size and other value types
//! - [`android_robot`] - Android Robot over `adb`
//! - [`agent_robot`] - Robot over WebDriverAgent, shared by iOS devices and Simulators
//! - [`ios_device`] / [`simulator`] - Platform hosts for [`agent_robot::AgentRobot`]
//! - [`wda_session`] / [`wda_client`] / [`wda_protocol`] - WebDriverAgent session and wire protocol
//! - [`wait`] - Polling wait engine
//! - [`cache`] / [`backoff`] - Element cache and retry schedules
//! - [`devices`] - Device discovery per platform
//! - [`shell`] / [`adb`] / [`simctl`] - Subprocess transport and tool wrappers
//! - [`config`] - Persistent configuration
//!
//! ## External Dependencies
//!
//! Each platform needs its vendor tool on `PATH`:
//!
//! - **adb** (Android platform tools) for Android devices
//! - **ios** ([go-ios](https://github.com/danielpaulus/go-ios)) for physical iOS devices
//! - **Xcode** (for `xcrun simctl`) for iOS Simulators
//!
//! iOS targets also need WebDriverAgent running on the device.
//!
//! ## Example
//!
//! ```no_run
//! use mobot_core::config::MobotConfig;
//! use mobot_core::devices::DeviceRegistry;
//! use mobot_core::element::ElementSelector;
//!
//! # async fn example() -> Result<(), mobot_core::robot::RobotError> {
//! let registry = DeviceRegistry::with_defaults(&MobotConfig::load());
//! let robot = registry.robot("emulator-5554").await?;
//!
//! let elements = robot.elements_on_screen().await?;
//! if let Some(login) = ElementSelector::text("Log in").find(&elements) {
//!     let (x, y) = login.center();
//!     robot.tap(x, y).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adb;
pub mod agent_robot;
pub mod android_robot;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod devices;
pub mod element;
pub mod ios_device;
pub mod logcat;
pub mod robot;
pub mod shell;
pub mod simctl;
pub mod simulator;
pub mod uiautomator;
pub mod wait;
pub mod wda_client;
pub mod wda_protocol;
pub mod wda_session;
