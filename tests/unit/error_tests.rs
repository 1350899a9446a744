//! Unit tests for error display and chaining.

use std::error::Error as _;

use agent_conductor::AppError;

#[test]
fn dependency_message_names_both_agents() {
    let err = AppError::DependencyUnmet {
        agent: "prd-generator".into(),
        dependency: "manifesto-generator".into(),
    };
    assert_eq!(
        err.to_string(),
        "missing dependency: manifesto-generator must complete before prd-generator"
    );
}

#[test]
fn process_exit_reports_code_and_signal() {
    let by_code = AppError::ProcessExit {
        agent: "A".into(),
        code: Some(1),
        signal: None,
    };
    assert_eq!(by_code.to_string(), "A process exited with code 1, signal none");

    let by_signal = AppError::ProcessExit {
        agent: "A".into(),
        code: None,
        signal: Some(15),
    };
    assert_eq!(by_signal.to_string(), "A process exited with code none, signal 15");
}

#[test]
fn invalid_agents_lists_every_name() {
    let err = AppError::InvalidAgents(vec!["x".into(), "y".into()]);
    assert_eq!(err.to_string(), "invalid agents: x, y");
}

#[test]
fn sequence_abort_exposes_cause() {
    let err = AppError::SequenceAborted {
        agent: "B".into(),
        source: Box::new(AppError::AgentNotFound("B".into())),
    };
    assert_eq!(err.to_string(), "sequence failed at B: agent not found: B");
    let source = err.source().expect("source");
    assert_eq!(source.to_string(), "agent not found: B");
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
    assert!(err.source().is_none());
}
