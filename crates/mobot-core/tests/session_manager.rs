//! Session lifecycle against a mock WebDriverAgent.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::MockAgent;
use mobot_core::wda_session::SessionManager;

fn manager(agent: &MockAgent, connect_timeout: Duration) -> SessionManager {
    SessionManager::new(agent.url(), connect_timeout, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn session_is_created_lazily_and_reused() {
    let agent = MockAgent::start().await;
    let sessions = manager(&agent, Duration::from_secs(5));
    assert_eq!(agent.sessions_created(), 0);

    let first = sessions.session_url().await.unwrap();
    let second = sessions.session_url().await.unwrap();

    assert_eq!(first, format!("{}/session/session-1", agent.url()));
    assert_eq!(first, second);
    assert_eq!(agent.count("POST", "/session"), 1);
    assert_eq!(agent.count("GET", "/session/session-1"), 1, "reuse is probed");
}

#[tokio::test]
async fn concurrent_callers_share_one_creation() {
    let agent = MockAgent::with_create_delay(Duration::from_millis(200)).await;
    let sessions = Arc::new(manager(&agent, Duration::from_secs(5)));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let sessions = sessions.clone();
        handles.push(tokio::spawn(async move { sessions.session_url().await }));
    }
    let mut urls = Vec::new();
    for handle in handles {
        urls.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(agent.count("POST", "/session"), 1);
    assert!(urls.iter().all(|u| u == &urls[0]), "{urls:?}");
}

#[tokio::test]
async fn dead_session_is_replaced() {
    let agent = MockAgent::start().await;
    let sessions = manager(&agent, Duration::from_secs(5));

    let first = sessions.session_url().await.unwrap();
    agent.state.session_alive.store(false, Ordering::SeqCst);
    let second = sessions.session_url().await.unwrap();

    assert_ne!(first, second);
    assert!(second.ends_with("/session/session-2"));
    assert_eq!(agent.sessions_created(), 2);
}

#[tokio::test]
async fn waiter_times_out_behind_slow_creation() {
    let agent = MockAgent::with_create_delay(Duration::from_secs(2)).await;
    let sessions = Arc::new(manager(&agent, Duration::from_millis(200)));

    let creator = {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.session_url().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = sessions.session_url().await.unwrap_err();
    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains("Timed out"));

    assert!(creator.await.unwrap().is_ok());
    assert_eq!(agent.count("POST", "/session"), 1);
}

#[tokio::test]
async fn failed_creation_is_actionable_and_not_remembered() {
    let agent = MockAgent::start().await;
    agent.state.fail_session_create.store(true, Ordering::SeqCst);
    let sessions = manager(&agent, Duration::from_secs(5));

    let err = sessions.session_url().await.unwrap_err();
    assert!(err.is_actionable());
    assert!(!sessions.has_session().await);

    agent.state.fail_session_create.store(false, Ordering::SeqCst);
    assert!(sessions.session_url().await.is_ok());
}

#[tokio::test]
async fn dispose_deletes_and_reconnect_recreates() {
    let agent = MockAgent::start().await;
    let sessions = manager(&agent, Duration::from_secs(5));

    sessions.session_url().await.unwrap();
    sessions.dispose().await;
    assert!(!sessions.has_session().await);
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);

    let url = sessions.reconnect().await.unwrap();
    assert!(url.ends_with("/session/session-2"));
}
