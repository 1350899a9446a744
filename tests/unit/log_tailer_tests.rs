//! Unit tests for incremental log tailing.

use agent_conductor::journal::tailer::LogTailer;

const T1: &str = "### 2024-01-01T00:00:00Z - A - ACTIVATED\nStatus: working\n";
const T2: &str = "### 2024-01-01T00:01:00Z - A - DECISION\nPicked sqlite\n";
const T3: &str = "### 2024-01-01T00:02:00Z - A - COMPLETED\n";
const OTHER: &str = "### 2024-01-01T00:01:30Z - B - ACTIVATED\n";

#[test]
fn each_entry_is_delivered_once_in_order() {
    let mut tailer = LogTailer::new("A");

    let first = tailer.take_new(T1);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].timestamp, "2024-01-01T00:00:00Z");

    let log = format!("{T1}{T2}{OTHER}{T3}");
    let rest = tailer.take_new(&log);
    let stamps: Vec<&str> = rest.iter().map(|e| e.timestamp.as_str()).collect();
    assert_eq!(stamps, vec!["2024-01-01T00:01:00Z", "2024-01-01T00:02:00Z"]);

    assert!(tailer.take_new(&log).is_empty());
    assert_eq!(tailer.delivered_count(), 3);
}

#[test]
fn other_agents_are_not_delivered() {
    let mut tailer = LogTailer::new("A");
    assert!(tailer.take_new(OTHER).is_empty());
    assert_eq!(tailer.agent(), "A");
}

#[test]
fn has_delivered_tracks_timestamps() {
    let mut tailer = LogTailer::new("A");
    let entries = tailer.take_new(T1);
    assert!(tailer.has_delivered(&entries[0]));
}

#[test]
fn duplicate_timestamps_in_one_scan_are_all_returned() {
    let mut tailer = LogTailer::new("A");
    let log = "### same - A - NOTE\none\n### same - A - NOTE\ntwo\n";
    assert_eq!(tailer.take_new(log).len(), 2);
    assert!(tailer.take_new(log).is_empty());
    assert_eq!(tailer.delivered_count(), 1);
}

#[test]
fn completed_header_is_delivered_after_a_partial_write() {
    let mut tailer = LogTailer::new("A");
    assert_eq!(tailer.take_new(&format!("{T1}### 2024-01-01T00:02:00Z - A - COMPL")).len(), 1);

    let fresh = tailer.take_new(&format!("{T1}{T3}"));
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].action, "COMPLETED");
}
