//! Decoding of the task status and metrics JSON files.

use std::path::Path;

use crate::models::tasks::{ActiveTask, MetricsSnapshot, TaskStatusFile};
use crate::{AppError, Result};

fn parse_failure(file: &Path, err: &serde_json::Error) -> AppError {
    AppError::Parse {
        file: file.display().to_string(),
        message: err.to_string(),
    }
}

/// Decode a status file body.
///
/// # Errors
///
/// Returns `AppError::Parse` naming `file` if the JSON is malformed or has
/// the wrong shape.
pub fn parse_status_file(file: &Path, raw: &str) -> Result<TaskStatusFile> {
    serde_json::from_str(raw).map_err(|err| parse_failure(file, &err))
}

/// Decode a metrics file body.
///
/// # Errors
///
/// Returns `AppError::Parse` naming `file` if the JSON is malformed.
pub fn parse_metrics_file(file: &Path, raw: &str) -> Result<MetricsSnapshot> {
    serde_json::from_str(raw).map_err(|err| parse_failure(file, &err))
}

/// Active tasks assigned to `agent`, in file order.
#[must_use]
pub fn tasks_for_agent<'a>(status: &'a TaskStatusFile, agent: &str) -> Vec<&'a ActiveTask> {
    status
        .active_tasks
        .iter()
        .filter(|task| task.agent.as_deref() == Some(agent))
        .collect()
}
