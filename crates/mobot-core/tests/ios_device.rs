//! Physical-device precondition chain against a mock agent and scripted go-ios.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{MockAgent, ScriptedRunner};
use mobot_core::agent_robot::AgentRobot;
use mobot_core::config::MobotConfig;
use mobot_core::ios_device::{IosDeviceHost, IosRobot};
use mobot_core::robot::{Platform, Robot};
use mobot_core::shell::CommandOutput;

const UDID: &str = "00008101-000A1B2C3D4E5F";

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn go_ios(version: &str) -> ScriptedRunner {
    ScriptedRunner::new().on(
        "ios info",
        CommandOutput::ok(format!("{{\"ProductVersion\":\"{version}\",\"DeviceName\":\"iPhone\"}}\n")),
    )
}

fn device(agent_port: u16, tunnel_port: u16, runner: ScriptedRunner) -> (IosRobot, Arc<ScriptedRunner>) {
    let runner = Arc::new(runner);
    let config = MobotConfig {
        agent_port,
        tunnel_port,
        ..MobotConfig::default()
    };
    let host = IosDeviceHost::new(UDID, runner.clone(), &config);
    (AgentRobot::new(host, &config), runner)
}

#[tokio::test]
async fn ios17_without_tunnel_is_actionable() {
    let agent = MockAgent::start().await;
    let (robot, _) = device(agent.addr.port(), closed_port(), go_ios("17.2.1"));

    let err = robot.elements_on_screen().await.unwrap_err();
    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains("tunnel"));
    assert!(!robot.is_ready());
    assert_eq!(agent.count("GET", "/status"), 0);
}

#[tokio::test]
async fn ios16_skips_tunnel_check() {
    let agent = MockAgent::start().await;
    let (robot, runner) = device(agent.addr.port(), closed_port(), go_ios("16.7"));

    robot.client().await.unwrap();
    assert!(robot.is_ready());
    assert_eq!(robot.platform(), Platform::Ios);
    assert_eq!(runner.count("ios info"), 1);
}

#[tokio::test]
async fn ios17_with_tunnel_passes() {
    let agent = MockAgent::start().await;
    let tunnel = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (robot, _) = device(agent.addr.port(), tunnel.local_addr().unwrap().port(), go_ios("17.0"));

    robot.client().await.unwrap();
    assert!(robot.is_ready());
}

#[tokio::test]
async fn closed_forward_port_is_actionable() {
    let (robot, _) = device(closed_port(), closed_port(), go_ios("16.4"));

    let err = robot.client().await.err().unwrap();
    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains("ios forward"));
}

#[tokio::test]
async fn agent_not_ready_is_actionable_then_chain_is_memoized() {
    let agent = MockAgent::start().await;
    agent.state.ready.store(false, Ordering::SeqCst);
    let (robot, runner) = device(agent.addr.port(), closed_port(), go_ios("16.4"));

    let err = robot.client().await.err().unwrap();
    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains("ios runwda"));
    assert_eq!(runner.count("ios info"), 1);

    agent.state.ready.store(true, Ordering::SeqCst);
    robot.client().await.unwrap();
    robot.tap(10, 10).await.unwrap();
    robot.elements_on_screen().await.unwrap();

    assert_eq!(runner.count("ios info"), 2, "chain reruns only until it succeeds");
    assert_eq!(agent.count("GET", "/status"), 2);
}

#[tokio::test]
async fn unreadable_device_info_is_actionable() {
    let agent = MockAgent::start().await;
    let runner = ScriptedRunner::new().on("ios info", CommandOutput::failed("device not found"));
    let (robot, _) = device(agent.addr.port(), closed_port(), runner);

    let err = robot.client().await.err().unwrap();
    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains(UDID));
}
