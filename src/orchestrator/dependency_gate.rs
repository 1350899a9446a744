//! Dependency gate backed by completion markers in the shared log.
//!
//! The log is re-read on every check: it is the only state shared by
//! independently spawned agents and survives orchestrator restarts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::journal::parser;

/// Decides whether an agent's prerequisites have logged completion.
#[derive(Debug, Clone)]
pub struct DependencyGate {
    log_path: PathBuf,
}

impl DependencyGate {
    /// Create a gate reading the log at `log_path`.
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Path of the log this gate reads.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Whether `agent` has a `COMPLETED` or `HANDOFF` marker in the log.
    ///
    /// A missing or unreadable log means not satisfied.
    pub async fn is_satisfied(&self, agent: &str) -> bool {
        match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => {
                let done = parser::log_marks_complete(&content, agent);
                debug!(agent, done, "dependency check");
                done
            }
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                warn!(%err, log = %self.log_path.display(), "failed to read project log");
                false
            }
        }
    }

    /// First dependency, in declaration order, that is not yet satisfied.
    ///
    /// Checks run one after another and stop at the first miss.
    pub async fn first_unmet<'a>(&self, dependencies: &'a [String]) -> Option<&'a str> {
        for dep in dependencies {
            if !self.is_satisfied(dep).await {
                return Some(dep.as_str());
            }
        }
        None
    }
}
