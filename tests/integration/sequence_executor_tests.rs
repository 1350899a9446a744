//! Mediated sequence execution against a fake runtime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_conductor::catalog::AgentCatalog;
use agent_conductor::models::agent::AgentMode;
use agent_conductor::monitor::watcher::WatchedFile;
use agent_conductor::monitor::{MonitorEvent, MonitorSettings, ProgressMonitor};
use agent_conductor::orchestrator::sequence_executor::{
    AfterFailure, AfterSuccess, Decision, ProgressIndicator, SequenceEnd, SequenceExecutor,
    StepAdvisor, StepOutcome,
};
use agent_conductor::orchestrator::{AgentEvent, AgentManager};
use agent_conductor::AppError;
use serde_json::json;
use tempfile::TempDir;

use super::test_helpers::{append_log, manager_for, monitor, project, Behavior, FakeLauncher};

const LIMIT: Duration = Duration::from_secs(10);

/// Replays queued decisions and records what it was asked.
#[derive(Debug, Default)]
struct ScriptedAdvisor {
    successes: Mutex<VecDeque<AfterSuccess>>,
    failures: Mutex<VecDeque<AfterFailure>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedAdvisor {
    fn new(successes: Vec<AfterSuccess>, failures: Vec<AfterFailure>) -> Arc<Self> {
        Arc::new(Self {
            successes: Mutex::new(successes.into()),
            failures: Mutex::new(failures.into()),
            asked: Mutex::default(),
        })
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl StepAdvisor for ScriptedAdvisor {
    fn after_success<'a>(
        &'a self,
        finished: &'a str,
        next: &'a str,
        _catalog: &'a AgentCatalog,
    ) -> Decision<'a, AfterSuccess> {
        self.asked
            .lock()
            .unwrap()
            .push(format!("success:{finished}->{next}"));
        let choice = self
            .successes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AfterSuccess::Continue);
        Box::pin(async move { choice })
    }

    fn after_failure<'a>(&'a self, failed: &'a str, error: &'a str) -> Decision<'a, AfterFailure> {
        self.asked
            .lock()
            .unwrap()
            .push(format!("failure:{failed}:{error}"));
        let choice = self
            .failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AfterFailure::Abort);
        Box::pin(async move { choice })
    }
}

#[derive(Debug, Default)]
struct RecordingIndicator {
    lines: Mutex<Vec<String>>,
}

impl RecordingIndicator {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressIndicator for RecordingIndicator {
    fn start(&self, agent: &str) {
        self.lines.lock().unwrap().push(format!("start {agent}"));
    }

    fn update(&self, agent: &str, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("update {agent} {message}"));
    }

    fn finish(&self, agent: &str, outcome: &StepOutcome) {
        let label = match outcome {
            StepOutcome::Completed => "ok",
            StepOutcome::Failed(_) => "failed",
        };
        self.lines
            .lock()
            .unwrap()
            .push(format!("finish {agent} {label}"));
    }
}

struct Harness {
    dir: TempDir,
    launcher: Arc<FakeLauncher>,
    manager: Arc<AgentManager>,
    monitor: Arc<ProgressMonitor>,
    indicator: Arc<RecordingIndicator>,
}

impl Harness {
    fn new() -> Self {
        let dir = project();
        let launcher = FakeLauncher::new();
        let manager = Arc::new(manager_for(dir.path(), launcher.clone()));
        let monitor = Arc::new(monitor(MonitorSettings {
            heartbeat: Duration::from_secs(3600),
            stall_threshold: Duration::from_secs(300),
        }));
        Self {
            dir,
            launcher,
            manager,
            monitor,
            indicator: Arc::new(RecordingIndicator::default()),
        }
    }

    fn executor(&self, advisor: Arc<ScriptedAdvisor>) -> SequenceExecutor {
        SequenceExecutor::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.monitor),
            advisor,
            self.indicator.clone(),
            self.dir.path().to_owned(),
            "fixer".into(),
        )
        .with_mode(AgentMode::Automatic)
    }
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn clean_run_asks_between_steps_only() {
    let h = Harness::new();
    let advisor = ScriptedAdvisor::new(vec![], vec![]);

    let report = h
        .executor(advisor.clone())
        .execute(names(&["alpha", "gamma"]), json!({"goal": "ship"}))
        .await
        .expect("runs");

    assert_eq!(report.completed, names(&["alpha", "gamma"]));
    assert_eq!(report.end, SequenceEnd::Finished);
    assert_eq!(advisor.asked(), vec!["success:alpha->gamma".to_owned()]);
    assert_eq!(h.launcher.contexts("alpha"), vec![json!({"context": {"goal": "ship"}})]);
    assert_eq!(
        h.indicator.lines(),
        names(&["start alpha", "finish alpha ok", "start gamma", "finish gamma ok"])
    );
}

#[tokio::test]
async fn unknown_agents_are_rejected_up_front() {
    let h = Harness::new();
    let err = h
        .executor(ScriptedAdvisor::new(vec![], vec![]))
        .execute(names(&["alpha", "nope"]), json!({}))
        .await
        .expect_err("invalid");
    assert!(matches!(err, AppError::InvalidAgents(ref bad) if *bad == names(&["nope"])));
    assert!(h.launcher.launches().is_empty());
}

#[tokio::test]
async fn retry_reruns_the_failed_step() {
    let h = Harness::new();
    h.launcher
        .script("gamma", &[Behavior::Exit(1), Behavior::Exit(0)]);
    let advisor = ScriptedAdvisor::new(vec![], vec![AfterFailure::Retry]);

    let report = h
        .executor(advisor.clone())
        .execute(names(&["gamma"]), json!({}))
        .await
        .expect("runs");

    assert_eq!(report.completed, names(&["gamma"]));
    assert_eq!(h.launcher.launch_count("gamma"), 2);
    assert_eq!(
        advisor.asked(),
        vec!["failure:gamma:gamma process exited with code 1, signal none".to_owned()]
    );
}

#[tokio::test]
async fn skip_moves_past_unmet_dependency() {
    let h = Harness::new();
    let advisor = ScriptedAdvisor::new(vec![], vec![AfterFailure::Skip]);

    let report = h
        .executor(advisor.clone())
        .execute(names(&["beta", "gamma"]), json!({}))
        .await
        .expect("runs");

    assert_eq!(report.skipped, names(&["beta"]));
    assert_eq!(report.completed, names(&["gamma"]));
    assert_eq!(h.launcher.launch_count("beta"), 0);
    assert!(advisor.asked()[0].starts_with("failure:beta:missing dependency: alpha"));
}

#[tokio::test]
async fn recover_dispatches_recovery_agent_with_error() {
    let h = Harness::new();
    h.launcher.script("gamma", &[Behavior::Exit(4)]);
    let advisor = ScriptedAdvisor::new(vec![], vec![AfterFailure::Recover]);

    let report = h
        .executor(advisor)
        .execute(names(&["gamma", "alpha"]), json!({}))
        .await
        .expect("runs");

    assert_eq!(report.recovered, names(&["gamma"]));
    assert_eq!(report.completed, names(&["alpha"]));
    assert_eq!(
        h.launcher.contexts("fixer"),
        vec![json!({
            "error": "gamma process exited with code 4, signal none",
            "failedAgent": "gamma",
        })]
    );
    assert_eq!(h.launcher.launches(), names(&["gamma", "fixer", "alpha"]));
}

#[tokio::test]
async fn abort_ends_the_run() {
    let h = Harness::new();
    h.launcher.script("alpha", &[Behavior::Exit(2)]);
    let advisor = ScriptedAdvisor::new(vec![], vec![AfterFailure::Abort]);

    let report = h
        .executor(advisor)
        .execute(names(&["alpha", "gamma"]), json!({}))
        .await
        .expect("runs");

    match report.end {
        SequenceEnd::Aborted { agent, error } => {
            assert_eq!(agent, "alpha");
            assert!(error.contains("code 2"));
        }
        other => panic!("unexpected end: {other:?}"),
    }
    assert_eq!(h.launcher.launch_count("gamma"), 0);
}

#[tokio::test]
async fn pause_stops_after_success() {
    let h = Harness::new();
    let advisor = ScriptedAdvisor::new(vec![AfterSuccess::Pause], vec![]);

    let report = h
        .executor(advisor)
        .execute(names(&["alpha", "gamma"]), json!({}))
        .await
        .expect("runs");

    assert_eq!(
        report.end,
        SequenceEnd::Paused {
            after: "alpha".into()
        }
    );
    assert_eq!(h.launcher.launches(), names(&["alpha"]));
}

#[tokio::test]
async fn substitute_replaces_next_step() {
    let h = Harness::new();
    let advisor = ScriptedAdvisor::new(
        vec![
            AfterSuccess::Substitute("fixer".into()),
            AfterSuccess::Substitute("not-in-catalog".into()),
        ],
        vec![],
    );

    let report = h
        .executor(advisor)
        .execute(names(&["alpha", "gamma", "alpha"]), json!({}))
        .await
        .expect("runs");

    assert_eq!(report.completed, names(&["alpha", "fixer", "alpha"]));
    assert_eq!(h.launcher.launch_count("gamma"), 0);
}

async fn wait_for_session(
    rx: &mut tokio::sync::broadcast::Receiver<MonitorEvent>,
    agent_name: &str,
) -> String {
    tokio::time::timeout(LIMIT, async {
        loop {
            if let Ok(MonitorEvent::Started { session_id, agent }) = rx.recv().await {
                if agent == agent_name {
                    return session_id;
                }
            }
        }
    })
    .await
    .expect("monitoring started")
}

async fn wait_for_spawn(rx: &mut tokio::sync::broadcast::Receiver<AgentEvent>) {
    tokio::time::timeout(LIMIT, async {
        loop {
            if let Ok(AgentEvent::Spawned { .. }) = rx.recv().await {
                return;
            }
        }
    })
    .await
    .expect("agent spawned");
}

#[tokio::test]
async fn logged_completion_stops_a_live_session() {
    let h = Harness::new();
    h.launcher.script("gamma", &[Behavior::Hold]);
    let executor = Arc::new(h.executor(ScriptedAdvisor::new(vec![], vec![])));
    let mut monitor_rx = h.monitor.subscribe();
    let mut agent_rx = h.manager.subscribe();

    let step = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run_step("gamma", json!({})).await })
    };

    let session_id = wait_for_session(&mut monitor_rx, "gamma").await;
    wait_for_spawn(&mut agent_rx).await;

    append_log(h.dir.path(), "### T1 - gamma - COMPLETED\n");
    h.monitor
        .handle_file_change(&session_id, WatchedFile::Log)
        .await;

    let outcome = tokio::time::timeout(LIMIT, step)
        .await
        .expect("step finished")
        .expect("task joined");
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(h.launcher.stop_count(), 1);
    assert!(h.manager.get_active_agents().await.is_empty());
    assert!(h.monitor.all_sessions().await.is_empty());
}

#[tokio::test]
async fn clean_exit_after_logged_error_is_a_failure() {
    let h = Harness::new();
    h.launcher.script("gamma", &[Behavior::Hold]);
    let executor = Arc::new(h.executor(ScriptedAdvisor::new(vec![], vec![])));
    let mut monitor_rx = h.monitor.subscribe();
    let mut agent_rx = h.manager.subscribe();

    let step = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run_step("gamma", json!({})).await })
    };

    let session_id = wait_for_session(&mut monitor_rx, "gamma").await;
    wait_for_spawn(&mut agent_rx).await;

    append_log(h.dir.path(), "### T1 - gamma - ERROR\nTests failed\n");
    h.monitor
        .handle_file_change(&session_id, WatchedFile::Log)
        .await;
    tokio::time::timeout(LIMIT, async {
        loop {
            if let Ok(MonitorEvent::Error { .. }) = monitor_rx.recv().await {
                return;
            }
        }
    })
    .await
    .expect("error observed");
    // Give the step loop a turn to record the logged error.
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.launcher.release_held(0);

    let outcome = tokio::time::timeout(LIMIT, step)
        .await
        .expect("step finished")
        .expect("task joined");
    assert_eq!(outcome, StepOutcome::Failed("Tests failed".into()));
    assert!(h
        .indicator
        .lines()
        .contains(&"update gamma error: Tests failed".to_owned()));
}
