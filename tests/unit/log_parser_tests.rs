//! Unit tests for the shared-log grammar.

use agent_conductor::journal::parser::{
    entries_for_agent, log_marks_complete, parse_entries, parse_header,
};

const SCENARIO: &str = "\
### 2024-01-01T00:00:00Z - A - ACTIVATED
Status: working
Progress: 10%

### 2024-01-01T00:01:00Z - B - ACTIVATED
### 2024-01-01T00:02:00Z - A - COMPLETED
All done
";

#[test]
fn entries_keep_file_order_and_fields() {
    let entries = parse_entries(SCENARIO);
    assert_eq!(entries.len(), 3);

    let first = &entries[0];
    assert_eq!(first.timestamp, "2024-01-01T00:00:00Z");
    assert_eq!(first.agent, "A");
    assert_eq!(first.action, "ACTIVATED");
    assert_eq!(first.status.as_deref(), Some("working"));
    assert_eq!(first.progress.as_deref(), Some("10%"));
    assert_eq!(first.details, "Status: working Progress: 10%");

    assert_eq!(entries[1].agent, "B");
    assert_eq!(entries[1].details, "");
    assert_eq!(entries[2].details, "All done");
}

#[test]
fn agent_filter_preserves_order() {
    let entries = entries_for_agent(SCENARIO, "A");
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["ACTIVATED", "COMPLETED"]);
    assert!(entries[1].is_completion());
}

#[test]
fn preamble_before_first_header_is_ignored() {
    let entries = parse_entries("# Project Log\nsome intro\n### t - A - NOTE\nbody\n");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details, "body");
}

#[test]
fn agent_names_are_matched_exactly() {
    assert!(entries_for_agent(SCENARIO, "a").is_empty());
}

#[test]
fn action_may_contain_separator() {
    let header = parse_header("### t - A - BLOCKED - waiting on B").expect("header");
    assert_eq!(header.action, "BLOCKED - waiting on B");
}

#[test]
fn classification_of_actions() {
    let log = "\
### t1 - A - ERROR
### t2 - A - NOTE
Status: ERROR
### t3 - A - BLOCKED
### t4 - A - HANDOFF
";
    let entries = parse_entries(log);
    assert!(entries[0].is_error());
    assert!(entries[1].is_error());
    assert!(entries[2].is_blocked());
    assert!(entries[3].is_completion());
}

#[test]
fn completion_marker_requires_agent_before_keyword() {
    assert!(log_marks_complete(SCENARIO, "A"));
    assert!(!log_marks_complete(SCENARIO, "B"));
    assert!(!log_marks_complete("COMPLETED by A\n", "A"));
}

#[test]
fn progress_and_status_lines_fill_one_entry() {
    let log = "\
### t - X - IN_PROGRESS
Progress: 42%
Status: ok
### t2 - Y - ACTIVATED
";
    let entries = entries_for_agent(log, "X");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].details.contains("42%"));
    assert_eq!(entries[0].status.as_deref(), Some("ok"));
    assert_eq!(entries[0].progress.as_deref(), Some("42%"));
}

#[test]
fn half_written_header_waits_for_its_newline() {
    let partial = "### t1 - A - ACTIVATED\n### t2 - A - COMPL";
    let entries = entries_for_agent(partial, "A");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp, "t1");

    let finished = "### t1 - A - ACTIVATED\n### t2 - A - COMPLETED\n";
    let entries = entries_for_agent(finished, "A");
    assert_eq!(entries.len(), 2);
    assert!(entries[1].is_completion());
}
