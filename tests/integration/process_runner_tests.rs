//! Integration tests driving real `sh` processes through the runner.

use std::time::Duration;

use agent_conductor::config::RuntimeConfig;
use agent_conductor::models::agent::{AgentDefinition, AgentMode, ExitReport};
use agent_conductor::orchestrator::runner::{
    AgentHandle, AgentLauncher, AgentProcessRunner, LaunchRequest, RunnerEvent,
};
use serde_json::json;
use serial_test::serial;
use tokio::sync::mpsc;

const LIMIT: Duration = Duration::from_secs(10);

fn runner(automatic: &[&str], interactive: &[&str], workdir: &std::path::Path) -> AgentProcessRunner {
    let runtime = RuntimeConfig {
        program: "sh".into(),
        automatic_args: automatic.iter().map(|s| (*s).to_owned()).collect(),
        interactive_args: interactive.iter().map(|s| (*s).to_owned()).collect(),
        ..RuntimeConfig::default()
    };
    AgentProcessRunner::new(
        runtime,
        workdir.to_owned(),
        "PROJECT_LOG.md".into(),
        Duration::from_millis(50),
    )
}

fn definition() -> AgentDefinition {
    AgentDefinition::new("alpha", "First step", 1, &[], &["testing"], &[])
}

/// Collect output until the exit notification arrives.
async fn run_to_exit(rx: &mut mpsc::UnboundedReceiver<RunnerEvent>) -> (String, String, ExitReport) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    loop {
        let event = tokio::time::timeout(LIMIT, rx.recv())
            .await
            .expect("runner event before timeout")
            .expect("channel open");
        match event {
            RunnerEvent::Output { data, .. } => stdout.push_str(&data),
            RunnerEvent::Stderr { data, .. } => stderr.push_str(&data),
            RunnerEvent::Exited { report, .. } => return (stdout, stderr, report),
        }
    }
}

#[tokio::test]
#[serial]
async fn automatic_run_reads_prompt_and_reports_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = runner(&["-c", "head -n 1; echo oops >&2"], &[], dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({"ticket": 1});

    let handle = runner
        .launch(LaunchRequest {
            instance_id: "alpha-1",
            definition: &def,
            context: &context,
            mode: AgentMode::Automatic,
            events: tx,
        })
        .await
        .expect("launch");
    assert!(matches!(handle, AgentHandle::Process(_)));
    assert!(handle.pid().is_some());

    let (stdout, stderr, report) = run_to_exit(&mut rx).await;
    assert!(stdout.starts_with("You are the alpha agent"), "{stdout}");
    assert_eq!(stderr.trim(), "oops");
    assert!(report.success());
}

#[tokio::test]
#[serial]
async fn nonzero_exit_code_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = runner(&["-c", "cat >/dev/null; exit 3"], &[], dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({});

    runner
        .launch(LaunchRequest {
            instance_id: "alpha-2",
            definition: &def,
            context: &context,
            mode: AgentMode::Automatic,
            events: tx,
        })
        .await
        .expect("launch");

    let (_, _, report) = run_to_exit(&mut rx).await;
    assert_eq!(report.code, Some(3));
    assert!(!report.success());
}

#[tokio::test]
#[serial]
async fn context_payload_is_exported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = runner(
        &["-c", "cat >/dev/null; printf '%s' \"$CLAUDE_AGENT_CONTEXT\""],
        &[],
        dir.path(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({"feature": "billing"});

    runner
        .launch(LaunchRequest {
            instance_id: "alpha-3",
            definition: &def,
            context: &context,
            mode: AgentMode::Automatic,
            events: tx,
        })
        .await
        .expect("launch");

    let (stdout, _, _) = run_to_exit(&mut rx).await;
    let payload: serde_json::Value = serde_json::from_str(&stdout).expect("json payload");
    assert_eq!(payload["agent"], "alpha");
    assert_eq!(payload["instanceId"], "alpha-3");
    assert_eq!(payload["context"]["feature"], "billing");
}

#[tokio::test]
#[serial]
async fn stop_terminates_with_sigterm() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = runner(&["-c", "cat >/dev/null; exec sleep 30"], &[], dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({});

    let handle = runner
        .launch(LaunchRequest {
            instance_id: "alpha-4",
            definition: &def,
            context: &context,
            mode: AgentMode::Automatic,
            events: tx,
        })
        .await
        .expect("launch");

    tokio::time::sleep(Duration::from_millis(200)).await;
    runner.stop(&handle).expect("signal delivered");

    let (_, _, report) = run_to_exit(&mut rx).await;
    assert_eq!(report.code, None);
    assert_eq!(report.signal, Some(15));
}

#[tokio::test]
#[serial]
async fn missing_program_is_a_launch_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = RuntimeConfig {
        program: "definitely-not-an-agent-runtime".into(),
        ..RuntimeConfig::default()
    };
    let runner = AgentProcessRunner::new(
        runtime,
        dir.path().to_owned(),
        "PROJECT_LOG.md".into(),
        Duration::ZERO,
    );
    let (tx, _rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({});

    let result = runner
        .launch(LaunchRequest {
            instance_id: "alpha-5",
            definition: &def,
            context: &context,
            mode: AgentMode::Automatic,
            events: tx,
        })
        .await;
    assert!(matches!(result, Err(agent_conductor::AppError::Launch(_))));
}

#[tokio::test]
#[serial]
async fn interactive_session_receives_prompt_on_terminal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = runner(&[], &["-c", "read line; echo \"got:$line\""], dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let def = definition();
    let context = json!({});

    let handle = runner
        .launch(LaunchRequest {
            instance_id: "alpha-6",
            definition: &def,
            context: &context,
            mode: AgentMode::Interactive,
            events: tx,
        })
        .await
        .expect("launch");
    assert!(matches!(handle, AgentHandle::Terminal(_)));

    let (output, stderr, report) = run_to_exit(&mut rx).await;
    assert!(output.contains("got:You are the alpha agent"), "{output}");
    assert!(stderr.is_empty());
    assert!(report.success());
}
