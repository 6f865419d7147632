//! Android devices and emulators, driven through `adb`.
//!
//! Every operation is an `adb -s <serial>` invocation. The UI tree comes
//! from `uiautomator dump`, which fails transiently while the foreground
//! activity is changing, so [`AndroidRobot`] retries it on the
//! [`BackoffPolicy::UI_DUMP`] schedule.
//!
//! Text outside ASCII cannot go through `input text`. It is pasted through
//! the clipboard instead, which needs the companion helper app
//! ([`COMPANION_PACKAGE`]) installed on the device. Whether it is installed
//! is probed once per Robot and remembered.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::adb::{escape_shell_text, Adb};
use crate::backoff::BackoffPolicy;
use crate::cache::Cached;
use crate::config::MobotConfig;
use crate::element::{
    Button, ElementSet, InstalledApp, Orientation, ScreenElement, ScreenSize, SwipeDirection,
};
use crate::logcat::AndroidDiagnostics;
use crate::robot::{LogReader, Platform, ProxyControl, Robot, RobotError};
use crate::shell::CommandRunner;
use crate::uiautomator;
use crate::wait::WaitSettings;

/// Package name of the companion helper app used for clipboard access.
pub const COMPANION_PACKAGE: &str = "com.mobilenext.devicekit";

/// Where to get the companion helper app.
pub const COMPANION_INSTALL_URL: &str = "https://github.com/mobile-next/devicekit-android";

const CLIPBOARD_RECEIVER: &str = "com.mobilenext.devicekit/.ClipboardBroadcastReceiver";

/// Hold time for a long press.
pub const LONG_PRESS_MS: u32 = 500;

/// Travel distance of a coordinate swipe when none is given.
pub const DEFAULT_SWIPE_DISTANCE: i32 = 400;

const PNG_SIGNATURE: &[u8] = b"\x89PNG";

/// Robot for one Android device.
pub struct AndroidRobot {
    adb: Adb,
    diagnostics: AndroidDiagnostics,
    swipe_duration: Duration,
    dump_policy: BackoffPolicy,
    companion: OnceCell<bool>,
    elements: Cached<ElementSet>,
    screen: Cached<ScreenSize>,
    wait_settings: WaitSettings,
    max_option_scrolls: u32,
}

impl AndroidRobot {
    pub fn new(serial: impl Into<String>, runner: Arc<dyn CommandRunner>, config: &MobotConfig) -> Self {
        let adb = Adb::new(
            runner,
            config.adb_path.as_str(),
            serial,
            config.command_timeout(),
        );
        Self {
            diagnostics: AndroidDiagnostics::new(adb.clone()),
            adb,
            swipe_duration: config.swipe_duration(),
            dump_policy: BackoffPolicy::UI_DUMP,
            companion: OnceCell::new(),
            elements: Cached::elements(),
            screen: Cached::until_invalidated(),
            wait_settings: config.wait_settings(),
            max_option_scrolls: config.select_option_max_scrolls,
        }
    }

    pub fn adb(&self) -> &Adb {
        &self.adb
    }

    /// Returns `true` if the companion helper app is installed. A failed
    /// probe is not remembered.
    pub async fn has_companion(&self) -> Result<bool, RobotError> {
        self.companion
            .get_or_try_init(|| async {
                let out = self
                    .adb
                    .shell(&["pm", "list", "packages", COMPANION_PACKAGE])
                    .await?;
                let installed = parse_package_list(&out)
                    .iter()
                    .any(|app| app.id == COMPANION_PACKAGE);
                debug!(installed, "companion helper probed");
                Ok::<_, RobotError>(installed)
            })
            .await
            .copied()
    }

    async fn require_companion(&self, purpose: &str) -> Result<(), RobotError> {
        if self.has_companion().await? {
            return Ok(());
        }
        Err(RobotError::Actionable(format!(
            "{purpose} needs the {COMPANION_PACKAGE} helper app, which is not installed on {}. \
             Install it from {COMPANION_INSTALL_URL} and try again.",
            self.adb.serial()
        )))
    }

    async fn clipboard_broadcast(&self, action: &str, extras: &[&str]) -> Result<String, RobotError> {
        let mut args = vec!["am", "broadcast", "-a", action];
        args.extend_from_slice(extras);
        args.extend_from_slice(&["-n", CLIPBOARD_RECEIVER]);
        self.adb.shell(&args).await
    }

    async fn write_clipboard(&self, text: &str) -> Result<(), RobotError> {
        let encoded = STANDARD.encode(text.as_bytes());
        self.clipboard_broadcast(
            "devicekit.clipboard.set",
            &["-e", "encoding", "base64", "-e", "text", encoded.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn key_event(&self, code: &str) -> Result<(), RobotError> {
        self.adb.shell(&["input", "keyevent", code]).await?;
        Ok(())
    }

    /// Returns `true` unless `dumpsys` positively shows no resumed activity.
    async fn activity_resumed(&self) -> bool {
        match self.adb.shell(&["dumpsys", "activity", "activities"]).await {
            Ok(out) => has_resumed_activity(&out),
            Err(e) => {
                debug!(error = %e, "activity probe failed, assuming resumed");
                true
            }
        }
    }

    async fn dump_once(&self) -> Result<Vec<ScreenElement>, RobotError> {
        // uiautomator exits non-zero on some builds even when the dump is good.
        let output = self
            .adb
            .raw(&["exec-out", "uiautomator", "dump", "/dev/tty"])
            .await?;
        let root = uiautomator::parse_hierarchy(&output.stdout_str())
            .map_err(|failure| RobotError::CommandFailed(failure.to_string()))?;
        Ok(uiautomator::collect_elements(&root))
    }

    #[instrument(skip(self), fields(serial = %self.adb.serial()), level = "debug")]
    async fn dump_elements(&self) -> Result<Vec<ScreenElement>, RobotError> {
        let policy = self.dump_policy;
        let mut last_error = String::from("no dump attempted");
        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(policy.delay_for(attempt - 2)).await;
                if !self.activity_resumed().await {
                    debug!(attempt, "foreground activity not resumed, skipping dump");
                    last_error = "the foreground activity was not resumed".to_string();
                    continue;
                }
            }
            match self.dump_once().await {
                Ok(elements) => {
                    debug!(attempt, count = elements.len(), "UI dump succeeded");
                    return Ok(elements);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "UI dump failed");
                    last_error = e.to_string();
                }
            }
        }
        warn!(attempts = policy.max_attempts, error = %last_error, "UI dump gave up");
        Err(RobotError::Actionable(format!(
            "Failed to read the UI hierarchy after {} attempts: {last_error}. \
             Make sure the device is unlocked and an app is in the foreground.",
            policy.max_attempts
        )))
    }

    async fn input_swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u128) -> Result<(), RobotError> {
        let args: Vec<String> = vec![
            from.0.to_string(),
            from.1.to_string(),
            to.0.to_string(),
            to.1.to_string(),
            duration_ms.to_string(),
        ];
        let mut all = vec!["input", "swipe"];
        all.extend(args.iter().map(String::as_str));
        self.adb.shell(&all).await?;
        Ok(())
    }

    /// Clears the element cache and passes `result` through.
    async fn settle<T>(&self, result: Result<T, RobotError>) -> Result<T, RobotError> {
        self.elements.invalidate().await;
        result
    }
}

#[async_trait]
impl Robot for AndroidRobot {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn device_id(&self) -> &str {
        self.adb.serial()
    }

    async fn screen_size(&self) -> Result<ScreenSize, RobotError> {
        if let Some(size) = self.screen.get().await {
            return Ok(size);
        }
        let out = self.adb.shell(&["wm", "size"]).await?;
        let (width, height) = parse_wm_size(&out).ok_or_else(|| {
            RobotError::CommandFailed(format!("unexpected `wm size` output: {}", out.trim()))
        })?;
        let size = ScreenSize {
            width,
            height,
            scale: 1.0,
        };
        self.screen.put(size).await;
        Ok(size)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RobotError> {
        let display = match self.adb.shell(&["cmd", "display", "get-displays"]).await {
            Ok(out) => active_display_id(&out),
            Err(e) => {
                debug!(error = %e, "display probe failed, using default display");
                None
            }
        };
        let mut args = vec!["screencap", "-p"];
        if let Some(id) = display.as_deref() {
            args.extend_from_slice(&["-d", id]);
        }
        let png = self.adb.exec_out(&args).await?;
        if !png.starts_with(PNG_SIGNATURE) {
            return Err(RobotError::CommandFailed(format!(
                "screencap returned {} bytes that are not a PNG image",
                png.len()
            )));
        }
        Ok(png)
    }

    async fn elements_on_screen(&self) -> Result<ElementSet, RobotError> {
        if let Some(set) = self.elements.get().await {
            debug!("element cache hit");
            return Ok(set);
        }
        let fresh: ElementSet = Arc::from(self.dump_elements().await?);
        self.elements.put(fresh.clone()).await;
        Ok(fresh)
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), RobotError> {
        let (x, y) = (x.to_string(), y.to_string());
        let result = self.adb.shell(&["input", "tap", x.as_str(), y.as_str()]).await;
        self.settle(result.map(drop)).await
    }

    async fn long_press(&self, x: i32, y: i32) -> Result<(), RobotError> {
        let result = self
            .input_swipe((x, y), (x, y), u128::from(LONG_PRESS_MS))
            .await;
        self.settle(result).await
    }

    async fn swipe(&self, direction: SwipeDirection) -> Result<(), RobotError> {
        let result = async {
            let size = self.screen_size().await?;
            let (from, to) = size.swipe_span(direction);
            self.input_swipe(from, to, self.swipe_duration.as_millis()).await
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
        let to = direction.offset(x, y, distance.unwrap_or(DEFAULT_SWIPE_DISTANCE));
        let result = self
            .input_swipe((x, y), to, self.swipe_duration.as_millis())
            .await;
        self.settle(result).await
    }

    async fn send_keys(&self, text: &str) -> Result<(), RobotError> {
        if text.is_empty() {
            return Ok(());
        }
        let result: Result<(), RobotError> = async {
            if text.is_ascii() {
                let escaped = escape_shell_text(text);
                self.adb.shell(&["input", "text", escaped.as_str()]).await?;
                return Ok(());
            }
            self.require_companion("Typing non-ASCII text").await?;
            self.write_clipboard(text).await?;
            self.key_event("KEYCODE_PASTE").await?;
            self.clipboard_broadcast("devicekit.clipboard.clear", &[]).await?;
            Ok(())
        }
        .await;
        self.settle(result).await
    }

    async fn press_button(&self, button: Button) -> Result<(), RobotError> {
        let result = self.key_event(key_code(button)).await;
        self.settle(result).await
    }

    async fn set_orientation(&self, orientation: Orientation) -> Result<(), RobotError> {
        self.screen.invalidate().await;
        let rotation = match orientation {
            Orientation::Portrait => "0",
            Orientation::Landscape => "1",
        };
        let result: Result<(), RobotError> = async {
            self.adb
                .shell(&["settings", "put", "system", "accelerometer_rotation", "0"])
                .await?;
            self.adb
                .shell(&["settings", "put", "system", "user_rotation", rotation])
                .await?;
            info!(serial = self.adb.serial(), %orientation, "orientation set");
            Ok(())
        }
        .await;
        self.screen.invalidate().await;
        self.settle(result).await
    }

    async fn orientation(&self) -> Result<Orientation, RobotError> {
        let out = self
            .adb
            .shell(&["settings", "get", "system", "user_rotation"])
            .await?;
        parse_user_rotation(&out).ok_or_else(|| {
            RobotError::CommandFailed(format!("unexpected user_rotation value: {}", out.trim()))
        })
    }

    async fn clipboard(&self) -> Result<String, RobotError> {
        self.require_companion("Reading the clipboard").await?;
        let out = self.clipboard_broadcast("devicekit.clipboard.get", &[]).await?;
        Ok(parse_broadcast_data(&out).unwrap_or_default())
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), RobotError> {
        self.require_companion("Setting the clipboard").await?;
        self.write_clipboard(text).await
    }

    async fn clear_clipboard(&self) -> Result<(), RobotError> {
        self.require_companion("Clearing the clipboard").await?;
        self.clipboard_broadcast("devicekit.clipboard.clear", &[]).await?;
        Ok(())
    }

    async fn hide_keyboard(&self) -> Result<(), RobotError> {
        let result: Result<(), RobotError> = async {
            let out = self.adb.shell(&["dumpsys", "input_method"]).await?;
            if out.contains("mInputShown=true") {
                self.key_event("4").await?;
            } else {
                debug!("keyboard not shown");
            }
            Ok(())
        }
        .await;
        self.settle(result).await
    }

    async fn launch_app(&self, app_id: &str) -> Result<(), RobotError> {
        let result: Result<(), RobotError> = async {
            let out = self
                .adb
                .shell(&[
                    "monkey",
                    "-p",
                    app_id,
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ])
                .await?;
            if out.contains("No activities found") {
                return Err(RobotError::Actionable(format!(
                    "{app_id} has no launchable activity on {}. \
                     Check the package name against the installed apps.",
                    self.adb.serial()
                )));
            }
            Ok(())
        }
        .await;
        self.settle(result).await
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), RobotError> {
        let result = self.adb.shell(&["am", "force-stop", app_id]).await;
        self.settle(result.map(drop)).await
    }

    async fn list_apps(&self) -> Result<Vec<InstalledApp>, RobotError> {
        let out = self.adb.shell(&["pm", "list", "packages", "-3"]).await?;
        Ok(parse_package_list(&out))
    }

    async fn open_url(&self, url: &str) -> Result<(), RobotError> {
        let escaped = escape_shell_text(url);
        let result = self
            .adb
            .shell(&[
                "am",
                "start",
                "-a",
                "android.intent.action.VIEW",
                "-d",
                escaped.as_str(),
            ])
            .await;
        self.settle(result.map(drop)).await
    }

    fn wait_settings(&self) -> WaitSettings {
        self.wait_settings
    }

    fn max_option_scrolls(&self) -> u32 {
        self.max_option_scrolls
    }

    fn log_reader(&self) -> Option<&dyn LogReader> {
        Some(&self.diagnostics)
    }

    fn proxy_control(&self) -> Option<&dyn ProxyControl> {
        Some(&self.diagnostics)
    }

    async fn dispose(&self) -> Result<(), RobotError> {
        self.elements.invalidate().await;
        self.screen.invalidate().await;
        Ok(())
    }
}

/// Android key event code for a button.
pub fn key_code(button: Button) -> &'static str {
    match button {
        Button::Back => "4",
        Button::Home => "3",
        Button::VolumeUp => "24",
        Button::VolumeDown => "25",
        Button::Enter => "66",
        Button::DpadUp => "19",
        Button::DpadDown => "20",
        Button::DpadLeft => "21",
        Button::DpadRight => "22",
        Button::DpadCenter => "23",
    }
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)x(\d+)").expect("size regex must compile"))
}

/// Parses `wm size` output, preferring the override size when present.
pub fn parse_wm_size(output: &str) -> Option<(i32, i32)> {
    let line_size = |prefix: &str| {
        output
            .lines()
            .find(|l| l.trim_start().starts_with(prefix))
            .and_then(|l| size_regex().captures(l))
            .and_then(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
    };
    line_size("Override size").or_else(|| line_size("Physical size"))
}

fn unique_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"uniqueId "local:(\d+)""#).expect("uniqueId regex must compile"))
}

fn display_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Display id (\d+)").expect("display id regex must compile"))
}

/// Picks the display to capture from `cmd display get-displays` output.
///
/// Returns `None` for single-display devices, where screencap needs no `-d`.
pub fn active_display_id(output: &str) -> Option<String> {
    let displays: Vec<&str> = output
        .lines()
        .filter(|l| display_id_regex().is_match(l))
        .collect();
    if displays.len() < 2 {
        return None;
    }
    let on = displays.iter().find(|l| l.contains("state ON"))?;
    unique_id_regex()
        .captures(on)
        .or_else(|| display_id_regex().captures(on))
        .map(|c| c[1].to_string())
}

/// Returns `true` if `dumpsys activity activities` shows a resumed activity.
pub fn has_resumed_activity(output: &str) -> bool {
    output.lines().any(|l| {
        (l.contains("mResumedActivity") || l.contains("topResumedActivity"))
            && l.contains("ActivityRecord")
    })
}

/// Maps a `user_rotation` setting to an orientation.
pub fn parse_user_rotation(value: &str) -> Option<Orientation> {
    match value.trim() {
        "0" | "2" => Some(Orientation::Portrait),
        "1" | "3" => Some(Orientation::Landscape),
        _ => None,
    }
}

/// Parses `pm list packages` output.
pub fn parse_package_list(output: &str) -> Vec<InstalledApp> {
    output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("package:"))
        .filter(|id| !id.is_empty())
        .map(|id| InstalledApp {
            id: id.to_string(),
            name: None,
        })
        .collect()
}

/// Extracts `data="..."` from an `am broadcast` result line.
pub fn parse_broadcast_data(output: &str) -> Option<String> {
    let start = output.find("data=\"")? + "data=\"".len();
    let rest = &output[start..];
    let end = rest.rfind('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::shell::{CommandOutput, Invocation, ShellError};

    /// Answers adb invocations by matching the command line against
    /// substrings, recording every call.
    struct Script {
        rules: Vec<(&'static str, CommandOutput)>,
        calls: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(rules: Vec<(&'static str, CommandOutput)>) -> Arc<Self> {
            Arc::new(Self {
                rules,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, needle: &str) -> usize {
            self.calls().iter().filter(|c| c.contains(needle)).count()
        }
    }

    #[async_trait]
    impl CommandRunner for Script {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError> {
            let line = invocation.command_line();
            self.calls.lock().unwrap().push(line.clone());
            Ok(self
                .rules
                .iter()
                .find(|(needle, _)| line.contains(needle))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput::ok("")))
        }
    }

    fn robot(script: &Arc<Script>) -> AndroidRobot {
        AndroidRobot::new("emulator-5554", script.clone(), &MobotConfig::default())
    }

    #[test]
    fn wm_size_prefers_override() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1600\n"),
            Some((720, 1600))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn display_selection() {
        let single = "Displays:\n  Display id 0: DisplayInfo{\"Built-in\", uniqueId \"local:4619827259835644672\", state ON}\n";
        assert_eq!(active_display_id(single), None);

        let multi = "\
Display id 0: DisplayInfo{\"Built-in\", uniqueId \"local:111\", state OFF}
Display id 2: DisplayInfo{\"Cover\", uniqueId \"local:222\", state ON}
";
        assert_eq!(active_display_id(multi).as_deref(), Some("222"));

        let virtual_only = "\
Display id 0: DisplayInfo{\"Built-in\", state OFF}
Display id 3: DisplayInfo{\"Virtual\", uniqueId \"virtual:x\", state ON}
";
        assert_eq!(active_display_id(virtual_only).as_deref(), Some("3"));
    }

    #[test]
    fn resumed_activity_detection() {
        assert!(has_resumed_activity(
            "  mResumedActivity: ActivityRecord{a1b2 u0 com.example/.Main t12}"
        ));
        assert!(has_resumed_activity(
            "    topResumedActivity=ActivityRecord{c3 u0 com.android.launcher3/.Launcher t1}"
        ));
        assert!(!has_resumed_activity("  mResumedActivity: null"));
    }

    #[test]
    fn rotation_values() {
        assert_eq!(parse_user_rotation("0\n"), Some(Orientation::Portrait));
        assert_eq!(parse_user_rotation("3"), Some(Orientation::Landscape));
        assert_eq!(parse_user_rotation("null"), None);
    }

    #[test]
    fn package_list_and_broadcast_data() {
        let apps = parse_package_list("package:com.example.one\npackage:com.example.two\n\n");
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].id, "com.example.two");

        let out = "Broadcasting: Intent { act=devicekit.clipboard.get }\nBroadcast completed: result=-1, data=\"say \"hi\"\"\n";
        assert_eq!(parse_broadcast_data(out).as_deref(), Some("say \"hi\""));
        assert_eq!(parse_broadcast_data("Broadcast completed: result=0"), None);
    }

    #[test]
    fn every_button_has_a_key_code() {
        for name in Button::ALL {
            let button: Button = name.parse().unwrap();
            assert!(key_code(button).parse::<u32>().is_ok());
        }
        assert_eq!(key_code(Button::Enter), "66");
    }

    #[tokio::test]
    async fn ascii_text_is_escaped() {
        let script = Script::new(vec![]);
        robot(&script).send_keys("hi there").await.unwrap();
        assert_eq!(
            script.calls(),
            vec!["adb -s emulator-5554 shell input text hi\\ there"]
        );
    }

    #[tokio::test]
    async fn unicode_text_without_companion_is_actionable() {
        let script = Script::new(vec![("pm list packages", CommandOutput::ok(""))]);
        let err = robot(&script).send_keys("héllo").await.unwrap_err();
        assert!(err.is_actionable());
        assert!(err.to_string().contains(COMPANION_PACKAGE));
        assert_eq!(script.count("input"), 0);
    }

    #[tokio::test]
    async fn unicode_text_pastes_through_companion() {
        let script = Script::new(vec![(
            "pm list packages",
            CommandOutput::ok(format!("package:{COMPANION_PACKAGE}\n")),
        )]);
        let robot = robot(&script);
        robot.send_keys("héllo").await.unwrap();
        robot.send_keys("日本").await.unwrap();

        assert_eq!(script.count("pm list packages"), 1, "probe is memoized");
        let calls = script.calls();
        let encoded = STANDARD.encode("héllo");
        assert!(calls[1].contains("devicekit.clipboard.set"));
        assert!(calls[1].contains(&encoded));
        assert!(calls[2].ends_with("input keyevent KEYCODE_PASTE"));
        assert!(calls[3].contains("devicekit.clipboard.clear"));
    }

    #[tokio::test]
    async fn hide_keyboard_only_when_shown() {
        let hidden = Script::new(vec![("input_method", CommandOutput::ok("mInputShown=false"))]);
        robot(&hidden).hide_keyboard().await.unwrap();
        assert_eq!(hidden.count("keyevent"), 0);

        let shown = Script::new(vec![("input_method", CommandOutput::ok("  mInputShown=true\n"))]);
        robot(&shown).hide_keyboard().await.unwrap();
        assert_eq!(shown.count("input keyevent 4"), 1);
    }

    #[tokio::test]
    async fn orientation_change_drops_screen_size() {
        let script = Script::new(vec![("wm size", CommandOutput::ok("Physical size: 1080x2400"))]);
        let robot = robot(&script);
        robot.screen_size().await.unwrap();
        robot.screen_size().await.unwrap();
        assert_eq!(script.count("wm size"), 1);

        robot.set_orientation(Orientation::Landscape).await.unwrap();
        robot.screen_size().await.unwrap();
        assert_eq!(script.count("wm size"), 2);
        assert_eq!(script.count("user_rotation 1"), 1);
        assert_eq!(script.count("accelerometer_rotation 0"), 1);
    }

    #[tokio::test]
    async fn swipe_spans_screen_center() {
        let script = Script::new(vec![("wm size", CommandOutput::ok("Physical size: 1000x2000"))]);
        robot(&script).swipe(SwipeDirection::Up).await.unwrap();
        assert!(script
            .calls()
            .iter()
            .any(|c| c.ends_with("input swipe 500 1600 500 400 300")));
    }

    #[tokio::test]
    async fn screenshot_rejects_non_png() {
        let script = Script::new(vec![("screencap", CommandOutput::ok("error: display off"))]);
        let err = robot(&script).screenshot().await.unwrap_err();
        assert!(matches!(err, RobotError::CommandFailed(_)));
    }

    #[tokio::test]
    async fn launch_without_activity_is_actionable() {
        let script = Script::new(vec![(
            "monkey",
            CommandOutput::ok("** No activities found to run, monkey aborted."),
        )]);
        let err = robot(&script).launch_app("com.missing").await.unwrap_err();
        assert!(err.is_actionable());
    }
}
