//! Monitoring session model and status transitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::journal::LogEntry;

/// Status derived for a monitored agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Session created; no entry seen yet.
    Starting,
    /// Agent is logging activity.
    Active,
    /// Agent went quiet or reported a blocker.
    Stalled,
    /// Agent logged completion or handoff.
    Completed,
    /// Agent logged an error.
    Error,
}

impl MonitorStatus {
    /// Determine whether a status transition is permitted.
    ///
    /// Status only moves toward a terminal state, except that `Stalled`
    /// may fall back to `Active`. An errored agent may still complete.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Starting | Self::Active | Self::Stalled,
                Self::Active | Self::Stalled | Self::Completed | Self::Error
            ) | (Self::Error, Self::Completed | Self::Error)
        )
    }

    /// Status implied by one log entry.
    #[must_use]
    pub fn for_entry(entry: &LogEntry) -> Self {
        if entry.is_error() {
            Self::Error
        } else if entry.is_completion() {
            Self::Completed
        } else if entry.is_blocked() {
            Self::Stalled
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stalled => "stalled",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Live view of one agent invocation built from the shared files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoringSession {
    /// Session identifier.
    pub id: String,
    /// Agent whose entries are tracked.
    pub agent_name: String,
    /// Project directory holding the watched files.
    pub project_path: PathBuf,
    /// Session creation time.
    pub start_time: DateTime<Utc>,
    /// Last observed change to any watched file.
    pub last_activity: DateTime<Utc>,
    /// Derived status.
    pub status: MonitorStatus,
    /// Latest progress text.
    pub progress: Option<String>,
    /// Files under watch.
    pub files_watched: Vec<PathBuf>,
}

impl MonitoringSession {
    /// Construct a session in `Starting` status.
    #[must_use]
    pub fn new(id: String, agent_name: String, project_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_name,
            project_path,
            start_time: now,
            last_activity: now,
            status: MonitorStatus::Starting,
            progress: None,
            files_watched: Vec::new(),
        }
    }

    /// Apply a transition if permitted; returns whether the status changed.
    pub fn transition(&mut self, next: MonitorStatus) -> bool {
        if self.status != next && self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
