//! Agent definition and instance models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static description of one pipeline agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentDefinition {
    /// Unique catalog key.
    pub name: String,
    /// One-line role description, embedded in the generated prompt.
    pub description: String,
    /// Ordering hint; lower phases run earlier.
    pub phase: i32,
    /// Event names that suggest running this agent.
    pub triggers: Vec<String>,
    /// Capability labels, embedded in the generated prompt.
    pub capabilities: Vec<String>,
    /// Agents that must log completion before this one may start.
    pub dependencies: Vec<String>,
}

impl AgentDefinition {
    /// Construct a definition from string slices.
    #[must_use]
    pub fn new(
        name: &str,
        description: &str,
        phase: i32,
        triggers: &[&str],
        capabilities: &[&str],
        dependencies: &[&str],
    ) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            phase,
            triggers: owned(triggers),
            capabilities: owned(capabilities),
            dependencies: owned(dependencies),
        }
    }

    /// Whether the agent can be started by hand at any time.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.triggers.iter().any(|t| t == "manual")
    }
}

/// How the external runtime is driven.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Persistent pseudo-terminal session.
    #[default]
    Interactive,
    /// One-shot process fed through piped stdin.
    Automatic,
}

/// Lifecycle status for a spawned agent instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance registered, process not yet launched.
    Starting,
    /// Process launched and alive.
    Running,
    /// Process exited with code 0.
    Completed,
    /// Process exited unsuccessfully.
    Error,
    /// Stopped by the orchestrator.
    Stopped,
}

impl InstanceStatus {
    /// Whether the instance is still live.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Whether the status is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
}

impl ExitReport {
    /// A zero exit code is the only success.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// One spawn of an agent; owned by the agent manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentInstance {
    /// Unique identifier derived from the agent name and a timestamp.
    pub id: String,
    /// Catalog name of the agent.
    pub name: String,
    /// Opaque structured payload handed to the agent.
    pub context: Value,
    /// Runtime mode.
    pub mode: AgentMode,
    /// Spawn time.
    pub start_time: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Output chunks in arrival order.
    pub output: Vec<String>,
    /// Most recent error text.
    pub error: Option<String>,
    /// Exit details once the process has ended.
    pub exit: Option<ExitReport>,
    /// Time the instance reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentInstance {
    /// Construct a fresh instance in `Starting` status.
    #[must_use]
    pub fn new(id: String, name: String, context: Value, mode: AgentMode) -> Self {
        Self {
            id,
            name,
            context,
            mode,
            start_time: Utc::now(),
            status: InstanceStatus::Starting,
            output: Vec::new(),
            error: None,
            exit: None,
            finished_at: None,
        }
    }
}
