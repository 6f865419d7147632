//! Command-line front end for the mobot device-control layer.
//!
//! Every device command resolves the device through the platform device
//! managers and then issues one Robot call against it.
//!
//! # Usage
//!
//! ```bash
//! # List devices on every platform
//! mobot devices
//!
//! # Tap at coordinates
//! mobot -d emulator-5554 tap 540 1200
//!
//! # Tap the first element whose label contains "Sign in"
//! mobot -d emulator-5554 tap-element --label "Sign in"
//!
//! # Swipe up from the screen center, or from a point
//! mobot -d emulator-5554 swipe up
//! mobot -d emulator-5554 swipe left --from 900 600 --distance 500
//!
//! # Type text
//! mobot -d emulator-5554 type "hello world"
//!
//! # Dump on-screen elements as JSON
//! mobot -d 00008101-001 elements -f json
//!
//! # Save a screenshot
//! mobot -d 00008101-001 screenshot -o screen.png
//!
//! # Wait up to 10 s for a spinner to go away
//! mobot -d emulator-5554 wait hidden --label Loading -t 10000
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use base64::Engine;
use clap::{Args, Parser, Subcommand};
use mobot_core::config::MobotConfig;
use mobot_core::devices::DeviceRegistry;
use mobot_core::element::{Button, ElementSelector, Orientation, SwipeDirection};
use mobot_core::robot::{Robot, RobotError};
use mobot_core::wait::{WaitCondition, WaitKind};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Control Android devices, iOS devices and iOS Simulators.
#[derive(Parser)]
#[command(name = "mobot")]
#[command(about = "Tap, swipe, type and inspect mobile devices from the command line")]
#[command(version)]
struct Cli {
    /// Device identifier (serial, UDID or simulator UUID)
    #[arg(short, long, global = true, env = "MOBOT_DEVICE")]
    device: Option<String>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to the adb binary
    #[arg(long, global = true, env = "MOBOT_ADB")]
    adb: Option<String>,

    /// Local port WebDriverAgent is reachable on
    #[arg(long, global = true, env = "MOBOT_AGENT_PORT")]
    agent_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Clone, Default)]
struct SelectorArgs {
    /// Substring of the accessibility label
    #[arg(short, long)]
    label: Option<String>,
    /// Substring of the visible text
    #[arg(long)]
    text: Option<String>,
    /// Substring of the resource id or accessibility identifier
    #[arg(long)]
    id: Option<String>,
    /// Substring of the element type (e.g. Button)
    #[arg(short = 'T', long = "type")]
    element_type: Option<String>,
}

impl SelectorArgs {
    fn selector(&self) -> ElementSelector {
        ElementSelector {
            label: self.label.clone(),
            text: self.text.clone(),
            element_type: self.element_type.clone(),
            identifier: self.id.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List devices on every platform
    Devices,

    /// Tap at screen coordinates
    Tap { x: i32, y: i32 },

    /// Tap the center of the first matching element
    TapElement {
        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// Long-press at screen coordinates
    LongPress { x: i32, y: i32 },

    /// Swipe in a direction: up, down, left, right
    Swipe {
        direction: String,
        /// Start point instead of the screen center
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        from: Option<Vec<i32>>,
        /// Travel distance in pixels when swiping from a point
        #[arg(long, requires = "from")]
        distance: Option<i32>,
    },

    /// Swipe inside the first matching element
    SwipeElement {
        direction: String,
        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// Type text into the focused field
    Type { text: String },

    /// Press a button (BACK, HOME, VOLUME_UP, VOLUME_DOWN, ENTER, DPAD_*)
    Button { name: String },

    /// List on-screen elements
    Elements,

    /// Capture a PNG screenshot (base64 on stdout unless -o is given)
    Screenshot {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Wait for an element condition or a fixed time
    Wait {
        /// visible, hidden, enabled or time
        kind: String,
        #[command(flatten)]
        selector: SelectorArgs,
        /// Timeout in milliseconds
        #[arg(short = 't', long, default_value = "5000", env = "MOBOT_TIMEOUT")]
        timeout: u64,
    },

    /// Show or set the orientation (portrait, landscape)
    Orientation { value: Option<String> },

    /// Tap the option whose text matches, scrolling to find it
    SelectOption { text: String },

    /// Dismiss the soft keyboard
    HideKeyboard,

    /// List installed apps
    Apps,

    /// Launch an app by package name or bundle id
    Launch { app_id: String },

    /// Terminate an app by package name or bundle id
    Terminate { app_id: String },

    /// Open a URL on the device
    OpenUrl { url: String },

    /// Show the clipboard, or replace it with TEXT
    Clipboard { text: Option<String> },

    /// Read device logs (Android)
    Logs {
        #[command(subcommand)]
        source: LogSource,
    },

    /// Show, set or clear the device HTTP proxy (Android)
    Proxy {
        /// host:port to set
        value: Option<String>,
        /// Remove the proxy setting
        #[arg(long, conflicts_with = "value")]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum LogSource {
    /// Recent log lines from a running app
    App {
        package: String,
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
    },
    /// Crash reports, optionally for one package
    Crashes { package: Option<String> },
    /// Recent error-level lines from the system log
    Errors {
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Actionable(message)) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    /// Operator-fixable condition, printed verbatim.
    Actionable(String),
    Usage(String),
    Failed(String),
    Output(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Actionable(_) => ExitCode::from(1),
            CliError::Failed(_) => ExitCode::from(2),
            CliError::Output(_) => ExitCode::from(3),
            CliError::Usage(_) => ExitCode::from(2),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Actionable(msg) => write!(f, "{msg}"),
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Failed(msg) => write!(f, "{msg}"),
            CliError::Output(msg) => write!(f, "Output error: {msg}"),
        }
    }
}

impl From<RobotError> for CliError {
    fn from(e: RobotError) -> Self {
        if e.is_actionable() {
            CliError::Actionable(e.to_string())
        } else {
            CliError::Failed(e.to_string())
        }
    }
}

fn config_for(cli: &Cli) -> MobotConfig {
    let mut config = MobotConfig::load();
    if let Some(adb) = &cli.adb {
        config.adb_path = adb.clone();
    }
    if let Some(port) = cli.agent_port {
        config.agent_port = port;
    }
    config
}

fn json_line(value: &impl serde::Serialize) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn require_selector(selector: &ElementSelector) -> Result<(), CliError> {
    if selector.is_empty() {
        return Err(CliError::Usage(
            "Give at least one of --label, --text, --id or --type to select an element.".into(),
        ));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = config_for(&cli);
    let registry = DeviceRegistry::with_defaults(&config);

    if let Command::Devices = cli.command {
        let devices = registry.list_all().await;
        if cli.format == OutputFormat::Json {
            return json_line(&devices);
        }
        if devices.is_empty() {
            eprintln!("No devices found");
        }
        for d in &devices {
            let version = d.os_version.as_deref().unwrap_or("-");
            println!("{}\t{}\t{}\t{}\t{}\t{}", d.id, d.platform, d.kind, version, d.state, d.name);
        }
        return Ok(());
    }

    // Arguments are parsed before the device is resolved.
    let command = prepare(cli.command)?;

    let Some(device) = cli.device.as_deref() else {
        return Err(CliError::Usage(
            "No device given. Pass --device or set MOBOT_DEVICE; `mobot devices` lists the ids.".into(),
        ));
    };
    let robot = registry.robot(device).await?;
    let result = execute(robot.as_ref(), command, cli.format).await;
    if let Err(e) = robot.dispose().await {
        tracing::debug!(error = %e, "dispose failed");
    }
    result
}

/// A device command with its arguments parsed into core types.
enum Prepared {
    Tap(i32, i32),
    TapElement(ElementSelector),
    LongPress(i32, i32),
    Swipe(SwipeDirection),
    SwipeFrom(i32, i32, SwipeDirection, Option<i32>),
    SwipeElement(ElementSelector, SwipeDirection),
    Type(String),
    Button(Button),
    Elements,
    Screenshot(Option<PathBuf>),
    Wait(WaitCondition),
    GetOrientation,
    SetOrientation(Orientation),
    SelectOption(String),
    HideKeyboard,
    Apps,
    Launch(String),
    Terminate(String),
    OpenUrl(String),
    GetClipboard,
    SetClipboard(String),
    Logs(LogSource),
    Proxy(ProxyRequest),
}

enum ProxyRequest {
    Show,
    Set(String, u16),
    Clear,
}

fn prepare(command: Command) -> Result<Prepared, CliError> {
    Ok(match command {
        Command::Devices => {
            return Err(CliError::Usage("`devices` does not act on a device.".into()))
        }
        Command::Tap { x, y } => Prepared::Tap(x, y),
        Command::TapElement { selector } => {
            let selector = selector.selector();
            require_selector(&selector)?;
            Prepared::TapElement(selector)
        }
        Command::LongPress { x, y } => Prepared::LongPress(x, y),
        Command::Swipe {
            direction,
            from,
            distance,
        } => {
            let direction: SwipeDirection = direction.parse()?;
            match from.as_deref() {
                Some([x, y]) => Prepared::SwipeFrom(*x, *y, direction, distance),
                Some(_) => return Err(CliError::Usage("--from takes exactly two values: X Y".into())),
                None => Prepared::Swipe(direction),
            }
        }
        Command::SwipeElement {
            direction,
            selector,
        } => {
            let selector = selector.selector();
            require_selector(&selector)?;
            Prepared::SwipeElement(selector, direction.parse()?)
        }
        Command::Type { text } => Prepared::Type(text),
        Command::Button { name } => Prepared::Button(name.parse()?),
        Command::Elements => Prepared::Elements,
        Command::Screenshot { output } => Prepared::Screenshot(output),
        Command::Wait {
            kind,
            selector,
            timeout,
        } => {
            let timeout = Duration::from_millis(timeout);
            let selector = selector.selector();
            let kind = match kind.to_ascii_lowercase().as_str() {
                "visible" => WaitKind::ElementVisible,
                "hidden" => WaitKind::ElementHidden,
                "enabled" => WaitKind::ElementEnabled,
                "time" => WaitKind::Time,
                other => {
                    return Err(CliError::Usage(format!(
                        "Unknown wait kind \"{other}\". Use visible, hidden, enabled or time."
                    )))
                }
            };
            if kind != WaitKind::Time {
                require_selector(&selector)?;
            }
            Prepared::Wait(match kind {
                WaitKind::ElementVisible => WaitCondition::visible(selector, timeout),
                WaitKind::ElementHidden => WaitCondition::hidden(selector, timeout),
                WaitKind::ElementEnabled => WaitCondition::enabled(selector, timeout),
                WaitKind::Time => WaitCondition::time(timeout),
            })
        }
        Command::Orientation { value: None } => Prepared::GetOrientation,
        Command::Orientation { value: Some(v) } => Prepared::SetOrientation(v.parse()?),
        Command::SelectOption { text } => Prepared::SelectOption(text),
        Command::HideKeyboard => Prepared::HideKeyboard,
        Command::Apps => Prepared::Apps,
        Command::Launch { app_id } => Prepared::Launch(app_id),
        Command::Terminate { app_id } => Prepared::Terminate(app_id),
        Command::OpenUrl { url } => Prepared::OpenUrl(url),
        Command::Clipboard { text: None } => Prepared::GetClipboard,
        Command::Clipboard { text: Some(t) } => Prepared::SetClipboard(t),
        Command::Logs { source } => Prepared::Logs(source),
        Command::Proxy { clear: true, .. } => Prepared::Proxy(ProxyRequest::Clear),
        Command::Proxy { value: None, .. } => Prepared::Proxy(ProxyRequest::Show),
        Command::Proxy { value: Some(v), .. } => {
            let parsed = v
                .rsplit_once(':')
                .and_then(|(host, port)| Some((host.to_string(), port.parse::<u16>().ok()?)))
                .filter(|(host, _)| !host.is_empty());
            match parsed {
                Some((host, port)) => Prepared::Proxy(ProxyRequest::Set(host, port)),
                None => {
                    return Err(CliError::Usage(format!(
                        "Proxy \"{v}\" is not in host:port form."
                    )))
                }
            }
        }
    })
}

fn unsupported(robot: &dyn Robot, what: &str) -> CliError {
    CliError::Actionable(format!(
        "{what} is not available for {} devices. It is supported on Android.",
        robot.platform()
    ))
}

async fn execute(robot: &dyn Robot, command: Prepared, format: OutputFormat) -> Result<(), CliError> {
    match command {
        Prepared::Tap(x, y) => robot.tap(x, y).await?,
        Prepared::TapElement(selector) => {
            let elements = robot.elements_on_screen().await?;
            let Some(element) = selector.find(&elements) else {
                return Err(CliError::Actionable(format!(
                    "No element matching {selector} is on screen. Run `mobot elements` to see what is."
                )));
            };
            let (x, y) = element.center();
            robot.tap(x, y).await?;
        }
        Prepared::LongPress(x, y) => robot.long_press(x, y).await?,
        Prepared::Swipe(direction) => robot.swipe(direction).await?,
        Prepared::SwipeFrom(x, y, direction, distance) => {
            robot.swipe_from_coordinate(x, y, direction, distance).await?
        }
        Prepared::SwipeElement(selector, direction) => {
            robot.swipe_on_element(&selector, direction).await?
        }
        Prepared::Type(text) => robot.send_keys(&text).await?,
        Prepared::Button(button) => robot.press_button(button).await?,
        Prepared::Elements => {
            let elements = robot.elements_on_screen().await?;
            if format == OutputFormat::Json {
                return json_line(&elements.to_vec());
            }
            for e in elements.iter() {
                let caption = e
                    .text
                    .as_deref()
                    .or(e.label.as_deref())
                    .or(e.name.as_deref())
                    .unwrap_or("");
                let id = e.identifier.as_deref().unwrap_or("");
                println!(
                    "{}\t\"{}\"\t{}\t({},{} {}x{})",
                    e.element_type, caption, id, e.rect.x, e.rect.y, e.rect.width, e.rect.height
                );
            }
            eprintln!("{} elements", elements.len());
        }
        Prepared::Screenshot(output) => {
            let png = robot.screenshot().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &png).map_err(|e| CliError::Output(e.to_string()))?;
                    eprintln!("Wrote {} bytes to {}", png.len(), path.display());
                }
                None => println!("{}", base64::engine::general_purpose::STANDARD.encode(&png)),
            }
        }
        Prepared::Wait(condition) => {
            let outcome = robot.wait_for(&condition).await;
            if format == OutputFormat::Json {
                json_line(&serde_json::json!({
                    "success": outcome.success,
                    "elapsed_ms": outcome.elapsed.as_millis() as u64,
                    "element": outcome.element,
                    "error": outcome.error.clone(),
                }))?;
            } else if outcome.success {
                eprintln!("Condition met after {}ms", outcome.elapsed.as_millis());
            }
            if !outcome.success {
                return Err(CliError::Failed(
                    outcome.error.unwrap_or_else(|| "wait failed".to_string()),
                ));
            }
        }
        Prepared::GetOrientation => println!("{}", robot.orientation().await?),
        Prepared::SetOrientation(orientation) => robot.set_orientation(orientation).await?,
        Prepared::SelectOption(text) => robot.select_option_by_text(&text).await?,
        Prepared::HideKeyboard => robot.hide_keyboard().await?,
        Prepared::Apps => {
            let apps = robot.list_apps().await?;
            if format == OutputFormat::Json {
                return json_line(&apps);
            }
            for app in &apps {
                match &app.name {
                    Some(name) => println!("{}\t{name}", app.id),
                    None => println!("{}", app.id),
                }
            }
        }
        Prepared::Launch(app_id) => robot.launch_app(&app_id).await?,
        Prepared::Terminate(app_id) => robot.terminate_app(&app_id).await?,
        Prepared::OpenUrl(url) => robot.open_url(&url).await?,
        Prepared::GetClipboard => println!("{}", robot.clipboard().await?),
        Prepared::SetClipboard(text) => robot.set_clipboard(&text).await?,
        Prepared::Logs(source) => {
            let reader = robot
                .log_reader()
                .ok_or_else(|| unsupported(robot, "Log access"))?;
            let text = match source {
                LogSource::App { package, lines } => reader.app_logs(&package, lines).await,
                LogSource::Crashes { package } => reader.crash_logs(package.as_deref()).await,
                LogSource::Errors { lines } => reader.system_errors(lines).await,
            };
            println!("{text}");
        }
        Prepared::Proxy(request) => {
            let proxy = robot
                .proxy_control()
                .ok_or_else(|| unsupported(robot, "Proxy control"))?;
            let text = match request {
                ProxyRequest::Show => proxy.proxy().await,
                ProxyRequest::Set(host, port) => proxy.set_proxy(&host, port).await,
                ProxyRequest::Clear => proxy.clear_proxy().await,
            };
            println!("{text}");
        }
    }
    Ok(())
}
