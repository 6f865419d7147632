//! WebDriverAgent session lifecycle.
//!
//! [`SessionManager`] owns at most one remote session against a
//! WebDriverAgent instance. Sessions are created lazily on the first call to
//! [`SessionManager::session_url`], re-validated with a liveness probe before
//! every reuse, and re-created transparently when that probe fails.
//!
//! Creation is single-flight: the session slot sits behind an async mutex
//! that the creator holds for the whole creation request, so concurrent
//! callers queue on the lock and then observe the creator's session instead
//! of starting their own.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mobot_core::wda_session::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = SessionManager::new("http://localhost:8100", Duration::from_secs(10), Duration::from_secs(30))?;
//! let url = sessions.session_url().await?;
//! println!("session at {url}");
//! sessions.dispose().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::robot::RobotError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long an idle pooled connection is kept for reuse.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Idle connections kept per agent.
const POOL_MAX_IDLE: usize = 4;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the WebDriverAgent HTTP transport.
#[derive(Error, Debug)]
pub enum WdaError {
    /// The request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The agent answered with a non-success status.
    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the JSON shape expected.
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),

    /// A payload inside the response could not be decoded.
    #[error("failed to decode agent payload: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Builds the pooled keep-alive client every agent request goes through.
pub fn agent_http_client(request_timeout: Duration) -> Result<Client, WdaError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    let client = Client::builder()
        .default_headers(headers)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE)
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

/// Sends `request` and returns the decoded JSON body.
///
/// Non-success statuses become [`WdaError::Status`]. An empty body decodes
/// to `Value::Null`.
pub(crate) async fn send_json(request: RequestBuilder, what: &str) -> Result<Value, WdaError> {
    let span = debug_span!("wda_request", what);
    async move {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "agent returned error status");
            return Err(WdaError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| WdaError::InvalidResponse(e.to_string()))
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Session {
    id: String,
    url: String,
}

/// Owns the lifecycle of one WebDriverAgent session.
#[derive(Debug)]
pub struct SessionManager {
    http: Client,
    base_url: String,
    connect_timeout: Duration,
    state: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Creates a manager for the agent at `base_url` with no session yet.
    ///
    /// `connect_timeout` bounds how long a caller waits for a session that
    /// another caller is creating; `request_timeout` bounds every HTTP
    /// request.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, WdaError> {
        Ok(Self::with_client(
            agent_http_client(request_timeout)?,
            base_url,
            connect_timeout,
        ))
    }

    /// Creates a manager sharing an existing HTTP client.
    pub fn with_client(http: Client, base_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout,
            state: Mutex::new(None),
        }
    }

    /// The agent's root URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The HTTP client used for agent requests.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Returns the URL of a live session, creating one if needed.
    ///
    /// An established session is probed with `GET /session/{id}` first and
    /// replaced if the probe fails. Fails actionably when the session cannot
    /// be created, or when another caller's creation holds the slot for
    /// longer than the connect timeout.
    pub async fn session_url(&self) -> Result<String, RobotError> {
        let mut state = tokio::time::timeout(self.connect_timeout, self.state.lock())
            .await
            .map_err(|_| {
                RobotError::Actionable(format!(
                    "Timed out after {}ms waiting for a WebDriverAgent session at {}. \
                     Check that WebDriverAgent is running and responsive, then retry.",
                    self.connect_timeout.as_millis(),
                    self.base_url
                ))
            })?;

        if let Some(session) = state.as_ref() {
            if self.is_alive(session).await {
                return Ok(session.url.clone());
            }
            warn!(session_id = %session.id, "session failed liveness probe, recreating");
            *state = None;
        }

        let session = self.create().await?;
        let url = session.url.clone();
        *state = Some(session);
        Ok(url)
    }

    /// Deletes the current session, if any. Never fails; local state is
    /// always cleared.
    pub async fn dispose(&self) {
        let Some(session) = self.state.lock().await.take() else {
            return;
        };
        let request = self.http.delete(&session.url);
        match send_json(request, "delete session").await {
            Ok(_) => info!(session_id = %session.id, "session disposed"),
            Err(e) => debug!(session_id = %session.id, error = %e, "session disposal failed, ignoring"),
        }
    }

    /// Disposes the current session and immediately establishes a new one.
    pub async fn reconnect(&self) -> Result<String, RobotError> {
        self.dispose().await;
        self.session_url().await
    }

    /// Returns `true` if a session is currently believed established.
    pub async fn has_session(&self) -> bool {
        self.state.lock().await.is_some()
    }

    async fn is_alive(&self, session: &Session) -> bool {
        match self.http.get(&session.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "session probe failed");
                false
            }
        }
    }

    async fn create(&self) -> Result<Session, RobotError> {
        let span = debug_span!("create_session", base_url = %self.base_url);
        async {
            let body = json!({
                "capabilities": {
                    "alwaysMatch": { "platformName": "iOS" }
                }
            });
            let request = self.http.post(format!("{}/session", self.base_url)).json(&body);
            let response = send_json(request, "create session")
                .await
                .map_err(|e| session_creation_failed(&self.base_url, &e.to_string()))?;

            let id = parse_session_id(&response)
                .ok_or_else(|| session_creation_failed(&self.base_url, "response had no sessionId"))?;
            info!(session_id = %id, "session created");
            Ok(Session {
                url: format!("{}/session/{}", self.base_url, id),
                id,
            })
        }
        .instrument(span)
        .await
    }
}

fn session_creation_failed(base_url: &str, reason: &str) -> RobotError {
    RobotError::Actionable(format!(
        "Failed to create a WebDriverAgent session at {base_url}: {reason}. \
         Make sure WebDriverAgent is installed and running on the device."
    ))
}

/// Reads the session id from `value.sessionId`, falling back to a top-level
/// `sessionId`.
fn parse_session_id(response: &Value) -> Option<String> {
    response
        .pointer("/value/sessionId")
        .or_else(|| response.get("sessionId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
