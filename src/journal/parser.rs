//! Line-oriented grammar for the shared project log.
//!
//! ```text
//! ### <timestamp> - <agent-name> - <ACTION>
//! <detail line>
//! Status: <token>
//! Progress: <text>
//! ### <next entry>
//! ```
//!
//! An entry is emitted only once its boundary (next header or end of
//! input) has been reached.

use regex::{Regex, RegexBuilder};

use crate::models::journal::LogEntry;

const HEADER_PREFIX: &str = "### ";
const FIELD_SEPARATOR: &str = " - ";

/// Header fields of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader<'a> {
    /// Timestamp text.
    pub timestamp: &'a str,
    /// Agent name.
    pub agent: &'a str,
    /// Action label.
    pub action: &'a str,
}

/// Parse a `### <timestamp> - <agent> - <action>` header line.
#[must_use]
pub fn parse_header(line: &str) -> Option<EntryHeader<'_>> {
    let rest = line.trim_end().strip_prefix(HEADER_PREFIX)?;
    let mut parts = rest.splitn(3, FIELD_SEPARATOR);
    let timestamp = parts.next()?.trim();
    let agent = parts.next()?.trim();
    let action = parts.next()?.trim();

    if timestamp.is_empty() || agent.is_empty() || action.is_empty() {
        return None;
    }

    Some(EntryHeader {
        timestamp,
        agent,
        action,
    })
}

/// Value of a `<label>: <value>` detail line, label matched case-insensitively.
fn labelled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    line.get(label.len()..)?.strip_prefix(':').map(str::trim)
}

/// Token of a `Status: <token>` line, lower-cased.
#[must_use]
pub fn parse_status(line: &str) -> Option<String> {
    let value = labelled(line.trim(), "status")?;
    let token: String = value
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!token.is_empty()).then(|| token.to_lowercase())
}

/// Text of a `Progress: <text>` line.
#[must_use]
pub fn parse_progress(line: &str) -> Option<String> {
    let value = labelled(line.trim(), "progress")?;
    (!value.is_empty()).then(|| value.to_owned())
}

/// Entry under construction.
struct PendingEntry {
    timestamp: String,
    agent: String,
    action: String,
    details: Vec<String>,
    status: Option<String>,
    progress: Option<String>,
}

impl PendingEntry {
    fn open(header: &EntryHeader<'_>) -> Self {
        Self {
            timestamp: header.timestamp.to_owned(),
            agent: header.agent.to_owned(),
            action: header.action.to_owned(),
            details: Vec::new(),
            status: None,
            progress: None,
        }
    }

    fn push_detail(&mut self, line: &str) {
        let trimmed = line.trim();
        if let Some(status) = parse_status(trimmed) {
            self.status = Some(status);
        }
        if let Some(progress) = parse_progress(trimmed) {
            self.progress = Some(progress);
        }
        self.details.push(trimmed.to_owned());
    }

    fn close(self) -> LogEntry {
        LogEntry {
            timestamp: self.timestamp,
            agent: self.agent,
            action: self.action,
            details: self.details.join(" "),
            status: self.status,
            progress: self.progress,
        }
    }
}

/// Parse every complete entry in `content`, in file order.
///
/// Text before the first header is ignored. A final line without a
/// trailing newline is still being written and is left for a later scan.
#[must_use]
pub fn parse_entries(content: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PendingEntry> = None;

    for line in terminated(content).lines() {
        if let Some(header) = parse_header(line) {
            if let Some(done) = current.take() {
                entries.push(done.close());
            }
            current = Some(PendingEntry::open(&header));
        } else if let Some(pending) = current.as_mut() {
            if !line.trim().is_empty() {
                pending.push_detail(line);
            }
        }
    }

    if let Some(done) = current {
        entries.push(done.close());
    }

    entries
}

/// `content` up to and including its last newline.
fn terminated(content: &str) -> &str {
    content.rfind('\n').map_or("", |end| &content[..=end])
}

/// Complete entries written by `agent`, in file order.
#[must_use]
pub fn entries_for_agent(content: &str, agent: &str) -> Vec<LogEntry> {
    parse_entries(content)
        .into_iter()
        .filter(|entry| entry.agent == agent)
        .collect()
}

/// Case-insensitive `<agent>.*(COMPLETED|HANDOFF)` matcher for one line.
#[must_use]
pub fn completion_regex(agent: &str) -> Option<Regex> {
    RegexBuilder::new(&format!("{}.*(COMPLETED|HANDOFF)", regex::escape(agent)))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Whether any line of `content` marks `agent` as completed or handed off.
#[must_use]
pub fn log_marks_complete(content: &str, agent: &str) -> bool {
    completion_regex(agent).is_some_and(|re| re.is_match(content))
}
