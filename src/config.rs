//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// External agent runtime invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Agent runtime binary (e.g., `claude`).
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments for persistent interactive sessions.
    #[serde(default)]
    pub interactive_args: Vec<String>,
    /// Arguments for one-shot automatic invocations.
    #[serde(default = "default_automatic_args")]
    pub automatic_args: Vec<String>,
    /// Pseudo-terminal width for interactive sessions.
    #[serde(default = "default_terminal_cols")]
    pub terminal_cols: u16,
    /// Pseudo-terminal height for interactive sessions.
    #[serde(default = "default_terminal_rows")]
    pub terminal_rows: u16,
    /// Environment variable carrying the `{agent, instanceId, context}` payload.
    #[serde(default = "default_context_env")]
    pub context_env: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            interactive_args: Vec::new(),
            automatic_args: default_automatic_args(),
            terminal_cols: default_terminal_cols(),
            terminal_rows: default_terminal_rows(),
            context_env: default_context_env(),
        }
    }
}

fn default_program() -> String {
    "claude".into()
}

fn default_automatic_args() -> Vec<String> {
    vec!["--non-interactive".into()]
}

fn default_terminal_cols() -> u16 {
    120
}

fn default_terminal_rows() -> u16 {
    30
}

fn default_context_env() -> String {
    "CLAUDE_AGENT_CONTEXT".into()
}

/// Well-known project files, relative to the project root.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProjectFiles {
    /// Shared append-only project log.
    #[serde(default = "default_log_file")]
    pub log: PathBuf,
    /// Task status JSON file.
    #[serde(default = "default_status_file")]
    pub status: PathBuf,
    /// Task metrics JSON file.
    #[serde(default = "default_metrics_file")]
    pub metrics: PathBuf,
    /// Persisted sequence store.
    #[serde(default = "default_sequences_file")]
    pub sequences: PathBuf,
}

impl Default for ProjectFiles {
    fn default() -> Self {
        Self {
            log: default_log_file(),
            status: default_status_file(),
            metrics: default_metrics_file(),
            sequences: default_sequences_file(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("PROJECT_LOG.md")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("TASKS").join("STATUS.json")
}

fn default_metrics_file() -> PathBuf {
    PathBuf::from("TASKS").join("METRICS.json")
}

fn default_sequences_file() -> PathBuf {
    PathBuf::from(".claude-agents-sequences.json")
}

/// Timer and polling intervals.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Delay before the prompt is written to an interactive session.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Status poll interval used while waiting for completion.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Retention of terminal instances before eviction.
    #[serde(default = "default_eviction_seconds")]
    pub eviction_seconds: u64,
    /// Stall check cadence.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    /// Inactivity after which an active session is considered stalled.
    #[serde(default = "default_stall_threshold_seconds")]
    pub stall_threshold_seconds: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            eviction_seconds: default_eviction_seconds(),
            heartbeat_seconds: default_heartbeat_seconds(),
            stall_threshold_seconds: default_stall_threshold_seconds(),
        }
    }
}

impl TimingConfig {
    /// Settle delay as a [`Duration`].
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Completion poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Eviction window as a [`Duration`].
    #[must_use]
    pub fn eviction(&self) -> Duration {
        Duration::from_secs(self.eviction_seconds)
    }

    /// Heartbeat cadence as a [`Duration`].
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Stall threshold as a [`Duration`].
    #[must_use]
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_seconds)
    }
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_eviction_seconds() -> u64 {
    60
}

fn default_heartbeat_seconds() -> u64 {
    30
}

fn default_stall_threshold_seconds() -> u64 {
    300
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_recovery_agent() -> String {
    "error-manager".into()
}

/// Global configuration parsed from `conductor.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Project directory holding the shared log and task files.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Agent runtime invocation settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Project file locations.
    #[serde(default)]
    pub files: ProjectFiles,
    /// Timer settings.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Agent dispatched when the operator asks for error recovery.
    #[serde(default = "default_recovery_agent")]
    pub recovery_agent: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            runtime: RuntimeConfig::default(),
            files: ProjectFiles::default(),
            timing: TimingConfig::default(),
            recovery_agent: default_recovery_agent(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `project_root`, validated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the project root does not exist.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self {
            project_root: project_root.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Absolute path to the shared project log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.project_root.join(&self.files.log)
    }

    /// Absolute path to the task status file.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.project_root.join(&self.files.status)
    }

    /// Absolute path to the task metrics file.
    #[must_use]
    pub fn metrics_path(&self) -> PathBuf {
        self.project_root.join(&self.files.metrics)
    }

    /// Absolute path to the sequence store.
    #[must_use]
    pub fn sequences_path(&self) -> PathBuf {
        self.project_root.join(&self.files.sequences)
    }

    /// Validate invariants and canonicalize the project root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&mut self) -> Result<()> {
        if self.runtime.program.trim().is_empty() {
            return Err(AppError::Config("runtime.program must not be empty".into()));
        }

        if self.runtime.context_env.trim().is_empty() {
            return Err(AppError::Config(
                "runtime.context_env must not be empty".into(),
            ));
        }

        let timing = &self.timing;
        for (name, value) in [
            ("poll_interval_ms", timing.poll_interval_ms),
            ("eviction_seconds", timing.eviction_seconds),
            ("heartbeat_seconds", timing.heartbeat_seconds),
            ("stall_threshold_seconds", timing.stall_threshold_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "timing.{name} must be greater than zero"
                )));
            }
        }

        if self.recovery_agent.trim().is_empty() {
            return Err(AppError::Config("recovery_agent must not be empty".into()));
        }

        let canonical_root = self
            .project_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("project_root invalid: {err}")))?;
        self.project_root = canonical_root;

        Ok(())
    }
}
