//! Idempotent incremental extraction of new log entries for one agent.

use std::collections::HashSet;

use crate::models::journal::LogEntry;

use super::parser;

/// Remembers which entries of one agent were already delivered.
///
/// Every call re-scans the whole log; de-duplication is by timestamp, so
/// redundant change notifications deliver nothing new.
#[derive(Debug, Clone)]
pub struct LogTailer {
    agent: String,
    delivered: HashSet<String>,
}

impl LogTailer {
    /// Create a tailer for `agent` with an empty delivered set.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            delivered: HashSet::new(),
        }
    }

    /// Agent this tailer follows.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Number of distinct timestamps delivered so far.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Whether an entry with this timestamp was already delivered.
    #[must_use]
    pub fn has_delivered(&self, entry: &LogEntry) -> bool {
        self.delivered.contains(&entry.delivery_key())
    }

    /// Entries of the full log `content` not delivered before, in log order.
    ///
    /// Membership is tested against the set as it stood before this scan;
    /// all returned timestamps are recorded afterwards.
    pub fn take_new(&mut self, content: &str) -> Vec<LogEntry> {
        let fresh: Vec<LogEntry> = parser::entries_for_agent(content, &self.agent)
            .into_iter()
            .filter(|entry| !self.has_delivered(entry))
            .collect();

        for entry in &fresh {
            self.delivered.insert(entry.delivery_key());
        }

        fresh
    }
}
