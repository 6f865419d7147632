//! Condition waiting over a caller-supplied element source.
//!
//! [`wait_for`] polls an async fetch function until a [`WaitCondition`] holds
//! or its timeout elapses. The poll interval grows by ×1.5 per round up to a
//! cap. Failures to fetch are treated as "no match this round", and a timeout
//! is reported through [`WaitOutcome::success`] rather than as an error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mobot_core::element::{ElementSelector, ElementSet};
//! use mobot_core::wait::{wait_for, WaitCondition, WaitSettings};
//!
//! # async fn example() {
//! let condition = WaitCondition::visible(ElementSelector::label("Submit"), Duration::from_secs(2));
//! let outcome = wait_for(&condition, &WaitSettings::default(), || async {
//!     Ok::<ElementSet, std::io::Error>(Arc::from(Vec::new()))
//! })
//! .await;
//! if !outcome.success {
//!     println!("gave up after {:?}", outcome.elapsed);
//! }
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::backoff::BackoffPolicy;
use crate::element::{ElementSelector, ElementSet, ScreenElement};

/// What a wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// A matching element is on screen.
    ElementVisible,
    /// No matching element is on screen.
    ElementHidden,
    /// A matching element is on screen and not reported disabled.
    ElementEnabled,
    /// A fixed amount of time passes.
    Time,
}

/// A single wait request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitCondition {
    pub kind: WaitKind,
    /// Required for the element kinds; ignored for [`WaitKind::Time`].
    #[serde(default)]
    pub selector: Option<ElementSelector>,
    /// Overall deadline; for [`WaitKind::Time`], the duration to sleep.
    pub timeout: Duration,
    /// Overrides the initial poll interval from [`WaitSettings`].
    #[serde(default)]
    pub poll_interval: Option<Duration>,
}

impl WaitCondition {
    /// Wait for a matching element to appear.
    pub fn visible(selector: ElementSelector, timeout: Duration) -> Self {
        Self::element(WaitKind::ElementVisible, selector, timeout)
    }

    /// Wait for every matching element to disappear.
    pub fn hidden(selector: ElementSelector, timeout: Duration) -> Self {
        Self::element(WaitKind::ElementHidden, selector, timeout)
    }

    /// Wait for a matching element that is not reported disabled.
    pub fn enabled(selector: ElementSelector, timeout: Duration) -> Self {
        Self::element(WaitKind::ElementEnabled, selector, timeout)
    }

    /// Sleep for `duration`.
    pub fn time(duration: Duration) -> Self {
        Self {
            kind: WaitKind::Time,
            selector: None,
            timeout: duration,
            poll_interval: None,
        }
    }

    fn element(kind: WaitKind, selector: ElementSelector, timeout: Duration) -> Self {
        Self {
            kind,
            selector: Some(selector),
            timeout,
            poll_interval: None,
        }
    }

    /// Overrides the initial poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// Poll interval defaults applied when a condition does not override them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitSettings {
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl WaitSettings {
    /// Growth factor applied to the poll interval each round.
    pub const MULTIPLIER: f64 = 1.5;
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
        }
    }
}

/// Result of a [`wait_for`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitOutcome {
    pub success: bool,
    /// The element that satisfied a visible/enabled condition.
    pub element: Option<ScreenElement>,
    pub elapsed: Duration,
    /// Why the wait failed, when it did.
    pub error: Option<String>,
}

impl WaitOutcome {
    fn succeeded(element: Option<ScreenElement>, elapsed: Duration) -> Self {
        Self {
            success: true,
            element,
            elapsed,
            error: None,
        }
    }

    fn failed(error: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            element: None,
            elapsed,
            error: Some(error),
        }
    }
}

/// Evaluates `condition` against elements returned by `fetch` until it holds
/// or the condition's timeout elapses.
///
/// Never returns an error: fetch failures count as "no match" for the round
/// in which they happen, and a timeout yields `success == false`. A round
/// whose fetch failed never satisfies a hidden condition, since an
/// unreadable screen says nothing about whether the element is gone.
pub async fn wait_for<F, Fut, E>(
    condition: &WaitCondition,
    settings: &WaitSettings,
    mut fetch: F,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ElementSet, E>>,
    E: Display,
{
    let start = Instant::now();

    if condition.kind == WaitKind::Time {
        tokio::time::sleep(condition.timeout).await;
        return WaitOutcome::succeeded(None, start.elapsed());
    }

    let Some(selector) = condition.selector.as_ref().filter(|s| !s.is_empty()) else {
        return WaitOutcome::failed(
            format!("{:?} requires an element selector", condition.kind),
            start.elapsed(),
        );
    };

    let policy = BackoffPolicy::polling(
        condition.poll_interval.unwrap_or(settings.initial_interval),
        WaitSettings::MULTIPLIER,
        settings.max_interval,
    );
    let deadline = start + condition.timeout;
    let mut delays = policy.delays();
    let mut last_fetch_error: Option<String>;

    loop {
        let found = match fetch().await {
            Ok(elements) => {
                last_fetch_error = None;
                selector.find(&elements).cloned()
            }
            Err(e) => {
                trace!(error = %e, "element fetch failed during wait");
                last_fetch_error = Some(e.to_string());
                None
            }
        };

        let satisfied = match condition.kind {
            WaitKind::ElementVisible => found.is_some(),
            WaitKind::ElementHidden => found.is_none() && last_fetch_error.is_none(),
            WaitKind::ElementEnabled => found.as_ref().is_some_and(|e| e.enabled != Some(false)),
            WaitKind::Time => true,
        };
        if satisfied {
            let element = match condition.kind {
                WaitKind::ElementHidden => None,
                _ => found,
            };
            debug!(kind = ?condition.kind, %selector, elapsed_ms = start.elapsed().as_millis() as u64, "wait satisfied");
            return WaitOutcome::succeeded(element, start.elapsed());
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let delay = delays.next().unwrap_or(settings.max_interval);
        tokio::time::sleep(delay.min(deadline - now)).await;
    }

    let elapsed = start.elapsed();
    let mut message = format!(
        "Timed out after {}ms waiting for {} {}",
        condition.timeout.as_millis(),
        match condition.kind {
            WaitKind::ElementVisible => "element to appear:",
            WaitKind::ElementHidden => "element to disappear:",
            _ => "element to become enabled:",
        },
        selector
    );
    if let Some(err) = last_fetch_error {
        message.push_str(&format!(" (last fetch error: {err})"));
    }
    debug!(kind = ?condition.kind, %selector, elapsed_ms = elapsed.as_millis() as u64, "wait timed out");
    WaitOutcome::failed(message, elapsed)
}
