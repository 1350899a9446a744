//! Task status and metrics file models.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Aggregate counts from the `summary` object of the status file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    /// Total task count.
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tasks: u64,
    /// Completed tasks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: u64,
    /// Tasks in progress.
    #[serde(default, deserialize_with = "null_as_default")]
    pub in_progress: u64,
    /// Blocked tasks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub blocked: u64,
    /// Errored tasks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errored: u64,
}

/// One entry of `active_tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveTask {
    /// Agent working on the task.
    #[serde(default)]
    pub agent: Option<String>,
    /// Task label.
    #[serde(default)]
    pub task: Option<String>,
    /// Free-form progress text.
    #[serde(default)]
    pub progress: Option<String>,
}

impl ActiveTask {
    /// Progress text to show for this task.
    #[must_use]
    pub fn progress_text(&self) -> String {
        self.progress.clone().unwrap_or_else(|| {
            format!("Working on {}", self.task.as_deref().unwrap_or("task"))
        })
    }
}

/// Decoded status file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStatusFile {
    /// Aggregate counts.
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: TaskSummary,
    /// Tasks currently being worked on.
    #[serde(default, deserialize_with = "null_as_default")]
    pub active_tasks: Vec<ActiveTask>,
}

/// Status writers emit `null` for counts they have not computed yet.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decoded metrics file; every field is forwarded without interpretation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Throughput figures.
    #[serde(default)]
    pub velocity: Option<Value>,
    /// Completion projections.
    #[serde(default)]
    pub projections: Option<Value>,
    /// Per-phase breakdown.
    #[serde(default)]
    pub phases: Option<Value>,
}
