//! Shared test helpers for mobot-core integration tests.
//!
//! Two fakes live here: a mock WebDriverAgent that speaks just enough
//! HTTP/1.1 (keep-alive included) for the agent client, and a scripted
//! [`CommandRunner`] that answers subprocess invocations for the
//! subprocess-driven Robots.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mobot_core::shell::{CommandOutput, CommandRunner, Invocation, ShellError};

// ---------------------------------------------------------------------------
// Mock agent
// ---------------------------------------------------------------------------

/// Bytes served by the mock `/screenshot` endpoint.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock-image";

/// One request the mock agent received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Value,
}

/// Knobs that change how the mock agent answers.
pub struct AgentState {
    pub ready: AtomicBool,
    pub session_alive: AtomicBool,
    pub fail_session_create: AtomicBool,
    pub fail_actions: AtomicBool,
    pub create_delay: Duration,
    sessions_created: AtomicUsize,
    pub source: Mutex<Value>,
}

/// A WebDriverAgent stand-in on a random local port.
pub struct MockAgent {
    pub addr: SocketAddr,
    pub state: Arc<AgentState>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockAgent {
    pub async fn start() -> Self {
        Self::with_create_delay(Duration::ZERO).await
    }

    /// An agent whose `POST /session` takes `create_delay` to answer.
    pub async fn with_create_delay(create_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AgentState {
            ready: AtomicBool::new(true),
            session_alive: AtomicBool::new(true),
            fail_session_create: AtomicBool::new(false),
            fail_actions: AtomicBool::new(false),
            create_delay,
            sessions_created: AtomicUsize::new(0),
            source: Mutex::new(default_source()),
        });
        let log = Arc::new(Mutex::new(Vec::new()));

        let (task_state, task_log) = (state.clone(), log.clone());
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(stream, task_state.clone(), task_log.clone()));
            }
        });

        Self { addr, state, log }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Number of requests whose method matches and whose path ends with
    /// `suffix`.
    pub fn count(&self, method: &str, suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(suffix))
            .count()
    }

    pub fn sessions_created(&self) -> usize {
        self.state.sessions_created.load(Ordering::SeqCst)
    }

    pub fn set_source(&self, source: Value) {
        *self.state.source.lock().unwrap() = source;
    }
}

/// A source tree with one button and one label.
pub fn default_source() -> Value {
    json!({
        "type": "Application",
        "label": "Demo",
        "isVisible": "1",
        "rect": {"x": 0, "y": 0, "width": 390, "height": 844},
        "children": [
            {
                "type": "Button",
                "label": "Continue",
                "name": "continue",
                "isVisible": "1",
                "isEnabled": "1",
                "rect": {"x": 20, "y": 700, "width": 350, "height": 44}
            },
            {
                "type": "StaticText",
                "label": "Welcome",
                "isVisible": "1",
                "rect": {"x": 20, "y": 100, "width": 200, "height": 30}
            }
        ]
    })
}

async fn serve_connection(mut stream: TcpStream, state: Arc<AgentState>, log: Arc<Mutex<Vec<Recorded>>>) {
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let head_end = loop {
            if let Some(pos) = find(&buffer, b"\r\n\r\n") {
                break pos;
            }
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();
        let content_length = lines
            .filter_map(|l| l.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = head_end + 4;
        while buffer.len() < body_start + content_length {
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
        }
        let body_bytes: Vec<u8> = buffer[body_start..body_start + content_length].to_vec();
        buffer.drain(..body_start + content_length);
        let body = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        let recorded = Recorded { method, path, body };
        log.lock().unwrap().push(recorded.clone());
        let (status, payload) = route(&recorded, &state).await;

        let text = payload.to_string();
        let response = format!(
            "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n{text}",
            if status == 200 { "OK" } else { "Error" },
            text.len()
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn route(request: &Recorded, state: &AgentState) -> (u16, Value) {
    let segments: Vec<&str> = request
        .path
        .trim_start_matches('/')
        .split('?')
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .split('/')
        .collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["status"]) => (
            200,
            json!({"value": {"ready": state.ready.load(Ordering::SeqCst)}}),
        ),
        ("POST", ["session"]) => {
            tokio::time::sleep(state.create_delay).await;
            if state.fail_session_create.load(Ordering::SeqCst) {
                return (500, json!({"value": {"error": "session not created"}}));
            }
            let n = state.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
            state.session_alive.store(true, Ordering::SeqCst);
            (200, json!({"value": {"sessionId": format!("session-{n}")}}))
        }
        ("GET", ["session", _]) => {
            if state.session_alive.load(Ordering::SeqCst) {
                (200, json!({"value": {}}))
            } else {
                (404, json!({"value": {"error": "invalid session id"}}))
            }
        }
        ("GET", ["source"]) => (200, json!({"value": state.source.lock().unwrap().clone()})),
        ("GET", ["screenshot"]) => (
            200,
            json!({"value": base64::engine::general_purpose::STANDARD.encode(PNG_BYTES)}),
        ),
        ("GET", ["session", _, "wda", "screen"]) => (
            200,
            json!({"value": {"screenSize": {"width": 390, "height": 844}, "scale": 3}}),
        ),
        ("POST", ["session", _, "actions"]) if state.fail_actions.load(Ordering::SeqCst) => {
            (500, json!({"value": {"error": "invalid argument"}}))
        }
        ("GET", ["session", _, "orientation"]) => (200, json!({"value": "PORTRAIT"})),
        _ => (200, json!({"value": null})),
    }
}

// ---------------------------------------------------------------------------
// Scripted command runner
// ---------------------------------------------------------------------------

struct Rule {
    needle: String,
    outputs: VecDeque<CommandOutput>,
}

/// Answers invocations whose command line contains a rule's needle. A rule
/// with several outputs plays them in order and repeats the last one.
/// Unmatched invocations succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, output: CommandOutput) -> Self {
        self.on_sequence(needle, vec![output])
    }

    pub fn on_sequence(self, needle: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            outputs: outputs.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError> {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(line.clone());
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| line.contains(&r.needle)) else {
            return Ok(CommandOutput::ok(""));
        };
        let output = if rule.outputs.len() > 1 {
            rule.outputs.pop_front().unwrap()
        } else {
            rule.outputs.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }
}

/// A small but realistic uiautomator dump.
pub const UI_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" bounds="[0,0][1080,2400]"><node index="0" text="Sign in" resource-id="com.example:id/sign_in" class="android.widget.Button" content-desc="" focused="false" enabled="true" bounds="[100,1000][980,1120]" /><node index="1" text="Forgot password?" resource-id="" class="android.widget.TextView" content-desc="" bounds="[100,1200][600,1260]" /></node></hierarchy>"#;

/// Output uiautomator prints when the window has no root yet.
pub const NULL_ROOT: &str = "ERROR: null root node returned by UiTestAutomationBridge.";

/// `dumpsys activity activities` with a resumed activity.
pub const RESUMED: &str = "  mResumedActivity: ActivityRecord{a1b2 u0 com.example/.MainActivity t12}";
