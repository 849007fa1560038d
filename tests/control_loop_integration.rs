//! End-to-end sessions against a synthetic desktop, a recording input
//! backend and a scripted oracle.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use deskpilot::config::Timing;
use deskpilot::engine::{CancelFlag, Checkpoint, ControlLoop, SessionStatus};
use deskpilot::error::OracleError;
use deskpilot::input::{InputEvent, MouseButton, RecordingBackend};
use deskpilot::providers::{Reply, ScriptedOracle, Tier, ToolCallRequest};
use deskpilot::capture::SyntheticScreen;
use deskpilot::tools::ToolName;
use deskpilot::Config;

fn test_config(dir: &Path, max_steps: u32) -> Config {
    Config {
        max_steps,
        dump_dir: dir.to_path_buf(),
        image_width: 64,
        image_height: 32,
        timing: Timing::instant(),
        ..Config::default()
    }
}

fn control(
    config: Config,
    oracle: &Arc<ScriptedOracle>,
) -> (ControlLoop<SyntheticScreen, RecordingBackend>, RecordingBackend) {
    let backend = RecordingBackend::new();
    let control = ControlLoop::new(
        config,
        SyntheticScreen::new(1000, 500),
        backend.clone(),
        oracle.clone(),
    );
    (control, backend)
}

fn phase_change(phase: &str, tools: &[&str]) -> Reply {
    Reply::call(
        "spawn_executor_prompt",
        json!({"prompt": "Confirm the result", "phase": phase, "rationale": "next"}),
    )
    .and_call(
        "update_phase_tools",
        json!({"tool_names": tools, "rationale": "switch"}),
    )
}

fn verification_phase(tools: &[&str]) -> Reply {
    phase_change("VERIFICATION", tools)
}

fn click(label: &str, x: u32, y: u32) -> Reply {
    Reply::call(
        "click_element",
        json!({"justification": "visible", "label": label, "position": [x, y]}),
    )
}

fn completion(chars: usize) -> Reply {
    Reply::call("report_completion", json!({ "evidence": "e".repeat(chars) }))
}

#[tokio::test]
async fn test_budget_exhaustion_in_fallback_phase() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle.push(Tier::Planner, Reply::text("1. MISSION\nopen notepad"));
    let (mut control, backend) = control(test_config(temp_dir.path(), 3), &oracle);

    let mut state = control.start("open notepad").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::MaxIterations { turns: 3 });
    assert_eq!(outcome.status.to_string(), "Max iterations reached (3 turns)");
    assert_eq!(outcome.final_phase, "FALLBACK");
    assert_eq!(outcome.archived_actions, 0);
    assert_eq!(state.doctrine(), "1. MISSION\nopen notepad");

    // supervisor only on turn 1, executor every turn
    assert_eq!(oracle.requests_for(Tier::Planner).len(), 1);
    assert_eq!(oracle.requests_for(Tier::Supervisor).len(), 1);
    assert_eq!(oracle.requests_for(Tier::Executor).len(), 3);
    assert!(backend.recorded().is_empty());

    for turn in 0..=3 {
        let frame = temp_dir.path().join(format!("screen_{:04}.png", turn));
        assert!(frame.exists(), "missing {}", frame.display());
    }
}

#[tokio::test]
async fn test_fallback_offers_builtin_tools() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    let (mut control, _) = control(test_config(temp_dir.path(), 1), &oracle);

    let mut state = control.start("anything").await.unwrap();
    control.run(&mut state).await.unwrap();

    let request = &oracle.requests_for(Tier::Executor)[0];
    let offered: Vec<&str> = request
        .tools
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert_eq!(
        offered,
        vec!["click_element", "press_key", "type_text", "scroll_down", "scroll_up"]
    );
    assert!(request.messages[1].has_image());
}

#[tokio::test]
async fn test_short_evidence_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Supervisor,
            verification_phase(&["report_completion", "click_element"]),
        )
        .push(Tier::Executor, completion(40));
    let (mut control, _) = control(test_config(temp_dir.path(), 3), &oracle);

    let mut state = control.start("check the clock").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::MaxIterations { turns: 3 });
    assert_eq!(outcome.final_phase, "VERIFICATION");
    assert_eq!(oracle.requests_for(Tier::Executor).len(), 3);
    assert!(state.history().is_empty());
}

#[tokio::test]
async fn test_sufficient_evidence_completes() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Supervisor,
            verification_phase(&["report_completion", "click_element"]),
        )
        .push(Tier::Executor, click("Clock", 500, 500))
        .push(Tier::Executor, completion(120));
    let (mut control, backend) = control(test_config(temp_dir.path(), 10), &oracle);

    let mut state = control.start("check the clock").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status.to_string(), "Completed in 2 turns");
    assert!(outcome.status.is_success());
    assert_eq!(outcome.turns, state.turn());
    assert_eq!(backend.moves(), vec![(500, 250)]);
    assert_eq!(state.history().len(), 1);
    assert_eq!(state.history()[0].result, "Clicked: Clock");
    assert_eq!(state.history()[0].screenshot, temp_dir.path().join("screen_0001.png").to_string_lossy());
}

#[tokio::test]
async fn test_verification_guard_rejects_completion_outside_verification() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        require_verification_phase: true,
        ..test_config(temp_dir.path(), 2)
    };
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Supervisor,
            phase_change("EXECUTION", &["report_completion", "click_element"]),
        )
        .push(Tier::Executor, completion(150));
    let (mut control, _) = control(config, &oracle);

    let mut state = control.start("check the clock").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::MaxIterations { turns: 2 });
    assert_eq!(outcome.final_phase, "EXECUTION");
    assert_eq!(oracle.requests_for(Tier::Executor).len(), 2);
}

#[tokio::test]
async fn test_verification_guard_accepts_completion_in_verification() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        require_verification_phase: true,
        ..test_config(temp_dir.path(), 2)
    };
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Supervisor,
            verification_phase(&["report_completion", "click_element"]),
        )
        .push(Tier::Executor, completion(150));
    let (mut control, _) = control(config, &oracle);

    let mut state = control.start("check the clock").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status.to_string(), "Completed in 1 turns");
    match outcome.status {
        SessionStatus::Completed { evidence, .. } => assert_eq!(evidence.len(), 150),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_only_first_of_two_calls_is_dispatched() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle.push(
        Tier::Executor,
        click("Start", 10, 990).and_call("press_key", json!({"key": "enter"})),
    );
    let (mut control, backend) = control(test_config(temp_dir.path(), 1), &oracle);

    let mut state = control.start("open start").await.unwrap();
    control.run(&mut state).await.unwrap();

    assert_eq!(state.history().len(), 1);
    assert_eq!(state.history()[0].tool, "click_element");
    assert_eq!(
        backend.events(),
        vec![
            InputEvent::ButtonDown(MouseButton::Left),
            InputEvent::ButtonUp(MouseButton::Left)
        ]
    );
}

#[tokio::test]
async fn test_tools_only_update_keeps_phase() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        supervisor_interval: 2,
        ..test_config(temp_dir.path(), 2)
    };
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Supervisor,
            Reply::call(
                "spawn_executor_prompt",
                json!({"prompt": "Look around", "phase": "RECONNAISSANCE", "rationale": "start"}),
            )
            .and_call(
                "update_phase_tools",
                json!({"tool_names": ["click_element"], "rationale": "look"}),
            ),
        )
        .push(
            Tier::Supervisor,
            Reply::call(
                "update_phase_tools",
                json!({"tool_names": ["press_key", "report_completion"], "rationale": "x"}),
            ),
        );
    let (mut control, _) = control(config, &oracle);

    let mut state = control.start("explore").await.unwrap();
    control.run(&mut state).await.unwrap();

    assert_eq!(oracle.requests_for(Tier::Supervisor).len(), 2);
    assert_eq!(state.phase_name(), "RECONNAISSANCE");
    assert_eq!(state.phase().tools, vec![ToolName::ClickElement]);
}

#[tokio::test]
async fn test_rejections_are_recorded_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push(
            Tier::Executor,
            Reply::call(
                "drag_element",
                json!({"label": "file", "start": [1, 1], "end": [9, 9]}),
            ),
        )
        .push(Tier::Executor, Reply::call("press_key", json!({"key": "ctrl+hyper"})))
        .push(
            Tier::Executor,
            Reply {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    name: "type_text".to_string(),
                    arguments: "{\"text\": ".to_string(),
                }],
            },
        );
    let (mut control, backend) = control(test_config(temp_dir.path(), 3), &oracle);

    let mut state = control.start("rename a file").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.turns, 3);
    let results: Vec<&str> = state.history().iter().map(|e| e.result.as_str()).collect();
    assert_eq!(results[0], "Error: tool 'drag_element' is not enabled for phase FALLBACK");
    assert_eq!(results[1], "Error: Unknown key 'hyper'");
    assert!(results[2].starts_with("Error: malformed arguments"));
    assert!(state.history().iter().all(|e| e.is_failure()));
    assert!(backend.recorded().is_empty());
}

#[tokio::test]
async fn test_repeated_action_raises_temperature_and_warns() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    for _ in 0..3 {
        oracle.push(Tier::Executor, click("OK", 500, 500));
    }
    let (mut control, _) = control(test_config(temp_dir.path(), 4), &oracle);

    let mut state = control.start("press ok").await.unwrap();
    control.run(&mut state).await.unwrap();

    let requests = oracle.requests_for(Tier::Executor);
    assert_eq!(requests.len(), 4);
    assert!((requests[2].temperature - 0.5).abs() < 1e-6);
    assert!((requests[3].temperature - 0.75).abs() < 1e-6);

    let context = requests[3].messages[1].text();
    assert!(context.contains("LOOP: click_element on 'OK' repeated 3x - CHANGE APPROACH"));
    assert!(!requests[2].messages[1].text().contains("LOOP:"));
}

#[tokio::test]
async fn test_planner_failure_degrades() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle.push_error(Tier::Planner, OracleError::Timeout);
    let (mut control, _) = control(test_config(temp_dir.path(), 1), &oracle);

    let state = control.start("open paint").await.unwrap();

    assert_eq!(state.doctrine(), "Planner invocation failed: request timed out");
    assert!(state.supervisor_prompt().contains("Planner invocation failed"));
}

#[tokio::test]
async fn test_supervisor_and_executor_failures_skip_the_turn() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle
        .push_error(Tier::Supervisor, OracleError::Timeout)
        .push_error(
            Tier::Executor,
            OracleError::Transport("connection refused".to_string()),
        )
        .push(Tier::Executor, click("OK", 100, 100));
    let (mut control, backend) = control(test_config(temp_dir.path(), 2), &oracle);

    let mut state = control.start("press ok").await.unwrap();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::MaxIterations { turns: 2 });
    assert_eq!(outcome.final_phase, "FALLBACK");
    assert_eq!(state.history().len(), 1);
    assert_eq!(state.history()[0].turn, 2);
    assert_eq!(state.history()[0].result, "Clicked: OK");
    assert_eq!(backend.moves().len(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_first_turn() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        supervisor_interval: 0,
        ..test_config(temp_dir.path(), 3)
    };
    let oracle = Arc::new(ScriptedOracle::new());
    let (mut control, _) = control(config, &oracle);

    let mut state = control.start("open paint").await.unwrap();
    let err = control.run(&mut state).await.unwrap_err();

    assert!(err.to_string().contains("supervisor_interval"));
    assert_eq!(state.turn(), 0);
    assert!(oracle.requests_for(Tier::Executor).is_empty());
}

#[tokio::test]
async fn test_cancellation_writes_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    let cancel = CancelFlag::new();
    let (control, _) = control(test_config(temp_dir.path(), 5), &oracle);
    let mut control = control.with_cancel_flag(cancel.clone());

    let mut state = control.start("open paint").await.unwrap();
    cancel.cancel();
    let outcome = control.run(&mut state).await.unwrap();

    assert_eq!(outcome.status.to_string(), "Cancelled after 0 turns");
    let raw = std::fs::read_to_string(temp_dir.path().join("checkpoint_T0.json")).unwrap();
    let checkpoint: Checkpoint = serde_json::from_str(&raw).unwrap();
    assert_eq!(checkpoint.mission, "open paint");
    assert_eq!(checkpoint.phase, "INIT");
    assert_eq!(checkpoint.reason, "cancelled");
}

#[tokio::test]
async fn test_device_failure_is_fatal_and_checkpointed() {
    let temp_dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    oracle.push(Tier::Executor, click("OK", 100, 100));
    let (mut control, backend) = control(test_config(temp_dir.path(), 5), &oracle);
    backend.fail_next_batches(1);

    let mut state = control.start("press ok").await.unwrap();
    let err = control.run(&mut state).await.unwrap_err();

    assert!(format!("{:#}", err).contains("input device failed"));
    assert_eq!(state.turn(), 1);
    let raw = std::fs::read_to_string(temp_dir.path().join("checkpoint_T1.json")).unwrap();
    let checkpoint: Checkpoint = serde_json::from_str(&raw).unwrap();
    assert_eq!(checkpoint.archive.len(), 1);
    assert!(checkpoint.archive[0].result.starts_with("Error: input failed"));
    assert!(checkpoint.reason.starts_with("fatal"));
}
