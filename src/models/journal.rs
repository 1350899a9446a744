//! Parsed shared-log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One structured entry of the shared project log.
///
/// Opened by a `### <timestamp> - <agent> - <action>` header and closed by
/// the next header or end of file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Timestamp text exactly as written in the header.
    pub timestamp: String,
    /// Agent that wrote the entry.
    pub agent: String,
    /// Action label, e.g. `ACTIVATED` or `COMPLETED`.
    pub action: String,
    /// Non-blank detail lines, trimmed and joined with single spaces.
    pub details: String,
    /// Lower-cased token from a `Status:` detail line.
    pub status: Option<String>,
    /// Text from a `Progress:` detail line.
    pub progress: Option<String>,
}

impl LogEntry {
    /// Timestamp parsed as RFC 3339, when it is one.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Key used for de-duplication.
    ///
    /// RFC 3339 timestamps are normalized so that equivalent spellings
    /// collapse; anything else is compared verbatim.
    #[must_use]
    pub fn delivery_key(&self) -> String {
        self.parsed_timestamp()
            .map_or_else(|| self.timestamp.clone(), |ts| ts.to_rfc3339())
    }

    /// Action reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.action.contains("ERROR") || self.status.as_deref() == Some("error")
    }

    /// Action reports completion or handoff.
    #[must_use]
    pub fn is_completion(&self) -> bool {
        self.action.contains("COMPLETED") || self.action.contains("HANDOFF")
    }

    /// Action reports a blocker.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.action.contains("BLOCKED")
    }
}
