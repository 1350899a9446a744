//! Unit tests for the log-backed dependency gate.

use agent_conductor::orchestrator::dependency_gate::DependencyGate;

#[tokio::test]
async fn missing_log_satisfies_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let gate = DependencyGate::new(dir.path().join("PROJECT_LOG.md"));
    assert!(!gate.is_satisfied("A").await);
}

#[tokio::test]
async fn completion_marker_satisfies_case_insensitively() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("PROJECT_LOG.md");
    std::fs::write(&log, "### 2024-01-01T00:00:00Z - prd-generator - completed\n")
        .expect("write");

    let gate = DependencyGate::new(&log);
    assert!(gate.is_satisfied("prd-generator").await);
    assert!(gate.is_satisfied("PRD-GENERATOR").await);
    assert!(!gate.is_satisfied("manifesto-generator").await);
}

#[tokio::test]
async fn handoff_counts_as_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("PROJECT_LOG.md");
    std::fs::write(&log, "note: alpha passed HANDOFF to beta\n").expect("write");

    assert!(DependencyGate::new(&log).is_satisfied("alpha").await);
}

#[tokio::test]
async fn activation_alone_does_not_satisfy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("PROJECT_LOG.md");
    std::fs::write(&log, "### t - alpha - ACTIVATED\nStatus: working\n").expect("write");

    assert!(!DependencyGate::new(&log).is_satisfied("alpha").await);
}

#[tokio::test]
async fn first_unmet_follows_declaration_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("PROJECT_LOG.md");
    std::fs::write(&log, "### t1 - beta - COMPLETED\n").expect("write");
    let gate = DependencyGate::new(&log);

    let deps = vec!["alpha".to_owned(), "beta".to_owned(), "gamma".to_owned()];
    assert_eq!(gate.first_unmet(&deps).await, Some("alpha"));

    let deps = vec!["beta".to_owned(), "gamma".to_owned()];
    assert_eq!(gate.first_unmet(&deps).await, Some("gamma"));

    let deps = vec!["beta".to_owned()];
    assert_eq!(gate.first_unmet(&deps).await, None);
}
