//! Android Robot behavior over a scripted `adb`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedRunner, NULL_ROOT, RESUMED, UI_DUMP};
use mobot_core::android_robot::AndroidRobot;
use mobot_core::config::MobotConfig;
use mobot_core::element::{Button, ElementSelector, SwipeDirection};
use mobot_core::robot::Robot;
use mobot_core::shell::CommandOutput;
use mobot_core::wait::WaitCondition;
use tokio::time::Instant;

const DUMP: &str = "uiautomator dump";

fn android(runner: ScriptedRunner) -> (AndroidRobot, Arc<ScriptedRunner>) {
    let runner = Arc::new(runner);
    let robot = AndroidRobot::new("emulator-5554", runner.clone(), &MobotConfig::default());
    (robot, runner)
}

#[tokio::test(start_paused = true)]
async fn dump_retries_then_fails_actionably() {
    let runner = ScriptedRunner::new()
        .on(DUMP, CommandOutput::ok(NULL_ROOT))
        .on("dumpsys activity", CommandOutput::ok(RESUMED));
    let (robot, runner) = android(runner);

    let start = Instant::now();
    let err = robot.elements_on_screen().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_actionable(), "got: {err}");
    assert!(err.to_string().contains("3 attempts"));
    assert_eq!(runner.count(DUMP), 3);
    assert!(
        elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(200),
        "elapsed {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn dump_recovers_on_a_later_attempt() {
    let runner = ScriptedRunner::new()
        .on_sequence(
            DUMP,
            vec![CommandOutput::ok("ERROR: could not get idle state."), CommandOutput::ok(UI_DUMP)],
        )
        .on("dumpsys activity", CommandOutput::ok(RESUMED));
    let (robot, runner) = android(runner);

    let elements = robot.elements_on_screen().await.unwrap();
    assert_eq!(runner.count(DUMP), 2);
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].text.as_deref(), Some("Sign in"));
    assert_eq!(elements[0].identifier.as_deref(), Some("com.example:id/sign_in"));
}

#[tokio::test(start_paused = true)]
async fn unresumed_activity_skips_dumps() {
    let runner = ScriptedRunner::new()
        .on(DUMP, CommandOutput::ok(NULL_ROOT))
        .on("dumpsys activity", CommandOutput::ok("  mResumedActivity: null"));
    let (robot, runner) = android(runner);

    let err = robot.elements_on_screen().await.unwrap_err();
    assert!(err.is_actionable());
    assert!(err.to_string().contains("not resumed"));
    assert_eq!(runner.count(DUMP), 1);
    assert_eq!(runner.count("dumpsys activity"), 2);
}

#[tokio::test(start_paused = true)]
async fn dump_output_with_failing_exit_status_is_used() {
    let runner = ScriptedRunner::new().on(
        DUMP,
        CommandOutput {
            success: false,
            stdout: UI_DUMP.as_bytes().to_vec(),
            stderr: Vec::new(),
        },
    );
    let (robot, _) = android(runner);
    assert_eq!(robot.elements_on_screen().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn element_cache_expires_after_ttl() {
    let (robot, runner) = android(ScriptedRunner::new().on(DUMP, CommandOutput::ok(UI_DUMP)));

    let first = robot.elements_on_screen().await.unwrap();
    tokio::time::advance(Duration::from_millis(150)).await;
    let second = robot.elements_on_screen().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(runner.count(DUMP), 1);

    tokio::time::advance(Duration::from_millis(60)).await;
    let third = robot.elements_on_screen().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(runner.count(DUMP), 2);
}

#[tokio::test(start_paused = true)]
async fn every_mutation_invalidates_elements() {
    let runner = ScriptedRunner::new()
        .on(DUMP, CommandOutput::ok(UI_DUMP))
        .on("wm size", CommandOutput::ok("Physical size: 1080x2400"))
        .on("input_method", CommandOutput::ok("mInputShown=true"));
    let (robot, runner) = android(runner);

    robot.elements_on_screen().await.unwrap();
    let mut expected = 1;
    macro_rules! assert_refetched {
        ($op:expr) => {{
            $op.await.unwrap();
            robot.elements_on_screen().await.unwrap();
            expected += 1;
            assert_eq!(runner.count(DUMP), expected, "after {}", stringify!($op));
        }};
    }

    assert_refetched!(robot.tap(10, 10));
    assert_refetched!(robot.long_press(10, 10));
    assert_refetched!(robot.swipe(SwipeDirection::Down));
    assert_refetched!(robot.swipe_from_coordinate(500, 500, SwipeDirection::Left, None));
    assert_refetched!(robot.send_keys("hello"));
    assert_refetched!(robot.press_button(Button::Back));
    assert_refetched!(robot.hide_keyboard());
    assert_refetched!(robot.launch_app("com.example"));
    assert_refetched!(robot.terminate_app("com.example"));
    assert_refetched!(robot.open_url("https://example.com/?a=1&b=2"));
}

#[tokio::test(start_paused = true)]
async fn long_press_and_coordinate_swipe_commands() {
    let (robot, runner) = android(ScriptedRunner::new());
    robot.long_press(300, 400).await.unwrap();
    robot
        .swipe_from_coordinate(500, 1500, SwipeDirection::Up, Some(600))
        .await
        .unwrap();
    robot
        .swipe_from_coordinate(500, 1500, SwipeDirection::Right, None)
        .await
        .unwrap();

    let calls = runner.calls();
    assert_eq!(calls[0], "adb -s emulator-5554 shell input swipe 300 400 300 400 500");
    assert_eq!(calls[1], "adb -s emulator-5554 shell input swipe 500 1500 500 900 300");
    assert_eq!(calls[2], "adb -s emulator-5554 shell input swipe 500 1500 900 1500 300");
}

#[tokio::test(start_paused = true)]
async fn wait_for_hidden_element() {
    let gone = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="Done" class="android.widget.TextView" bounds="[0,0][100,100]" /></hierarchy>"#;
    let runner = ScriptedRunner::new().on_sequence(
        DUMP,
        vec![CommandOutput::ok(UI_DUMP), CommandOutput::ok(gone)],
    );
    let (robot, _) = android(runner);

    let outcome = robot
        .wait_for(&WaitCondition::hidden(
            ElementSelector::text("Sign in"),
            Duration::from_secs(2),
        ))
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.elapsed >= Duration::from_millis(100));
}

#[tokio::test]
async fn diagnostics_are_available() {
    let runner = ScriptedRunner::new()
        .on("pidof", CommandOutput::failed(""))
        .on("http_proxy", CommandOutput::ok("10.0.2.2:8888\n"));
    let (robot, _) = android(runner);

    let logs = robot.log_reader().unwrap().app_logs("com.example", 50).await;
    assert!(logs.contains("not running"));

    let proxy = robot.proxy_control().unwrap().proxy().await;
    assert_eq!(proxy, "HTTP proxy: 10.0.2.2:8888");
}
