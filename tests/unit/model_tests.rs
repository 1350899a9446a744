//! Unit tests for domain models.

use std::collections::HashSet;

use agent_conductor::models::agent::{AgentInstance, AgentMode, ExitReport, InstanceStatus};
use agent_conductor::models::instance_id;
use agent_conductor::models::journal::LogEntry;
use agent_conductor::models::monitoring::{MonitorStatus, MonitoringSession};
use agent_conductor::models::sequence::AgentSequence;

fn entry(action: &str, status: Option<&str>) -> LogEntry {
    LogEntry {
        timestamp: "2024-01-01T00:00:00Z".into(),
        agent: "A".into(),
        action: action.into(),
        details: String::new(),
        status: status.map(str::to_owned),
        progress: None,
    }
}

#[test]
fn instance_ids_are_unique_and_prefixed() {
    let ids: Vec<String> = (0..100).map(|_| instance_id("task-executor")).collect();
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.iter().all(|id| id.starts_with("task-executor-")));
}

#[test]
fn new_instance_starts_empty() {
    let inst = AgentInstance::new(
        "a-1".into(),
        "a".into(),
        serde_json::json!({}),
        AgentMode::Automatic,
    );
    assert_eq!(inst.status, InstanceStatus::Starting);
    assert!(inst.status.is_active());
    assert!(inst.output.is_empty());
    assert!(inst.exit.is_none());
}

#[test]
fn instance_status_terminality() {
    assert!(InstanceStatus::Running.is_active());
    for status in [
        InstanceStatus::Completed,
        InstanceStatus::Error,
        InstanceStatus::Stopped,
    ] {
        assert!(status.is_terminal());
    }
}

#[test]
fn only_zero_exit_is_success() {
    assert!(ExitReport { code: Some(0), signal: None }.success());
    assert!(!ExitReport { code: Some(2), signal: None }.success());
    assert!(!ExitReport { code: None, signal: Some(9) }.success());
}

#[test]
fn entry_classification_picks_status() {
    assert_eq!(MonitorStatus::for_entry(&entry("ACTIVATED", None)), MonitorStatus::Active);
    assert_eq!(MonitorStatus::for_entry(&entry("COMPLETED", None)), MonitorStatus::Completed);
    assert_eq!(MonitorStatus::for_entry(&entry("HANDOFF", None)), MonitorStatus::Completed);
    assert_eq!(MonitorStatus::for_entry(&entry("BLOCKED", None)), MonitorStatus::Stalled);
    assert_eq!(MonitorStatus::for_entry(&entry("ERROR", None)), MonitorStatus::Error);
    assert_eq!(
        MonitorStatus::for_entry(&entry("NOTE", Some("error"))),
        MonitorStatus::Error
    );
}

#[test]
fn monitor_status_is_monotonic() {
    use MonitorStatus::{Active, Completed, Error, Stalled, Starting};

    assert!(Starting.can_transition_to(Active));
    assert!(Active.can_transition_to(Stalled));
    assert!(Stalled.can_transition_to(Active));
    assert!(Error.can_transition_to(Completed));
    assert!(!Error.can_transition_to(Active));
    assert!(!Completed.can_transition_to(Active));
    assert!(!Completed.can_transition_to(Error));
    assert!(!Active.can_transition_to(Starting));
}

#[test]
fn session_transition_reports_change() {
    let mut session = MonitoringSession::new("s".into(), "A".into(), ".".into());
    assert!(session.transition(MonitorStatus::Active));
    assert!(!session.transition(MonitorStatus::Active));
    assert!(session.transition(MonitorStatus::Completed));
    assert!(!session.transition(MonitorStatus::Error));
    assert_eq!(session.status, MonitorStatus::Completed);
}

#[test]
fn sequence_keeps_agent_order() {
    let seq = AgentSequence::new("s".into(), vec!["b".into(), "a".into()]);
    assert_eq!(seq.agents, vec!["b".to_owned(), "a".to_owned()]);
    assert_eq!(seq.name, "s");
}
