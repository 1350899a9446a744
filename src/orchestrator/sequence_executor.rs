//! Mediated sequence execution.
//!
//! Runs an ordered agent list one step at a time, binding monitor signals
//! to a live progress indicator. Every step outcome is handed to a
//! [`StepAdvisor`]: after a success it may continue, substitute the next
//! agent, or pause; after a failure it must pick retry, skip, recovery, or
//! abort. Failures are never absorbed without a decision.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, info_span, warn, Instrument};

use crate::catalog::AgentCatalog;
use crate::models::agent::AgentMode;
use crate::monitor::{MonitorEvent, ProgressMonitor};
use crate::orchestrator::agent_manager::{AgentEvent, AgentManager};
use crate::{AppError, Result};

/// Boxed future returned by [`StepAdvisor`] methods.
pub type Decision<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Agent logged completion or its process exited cleanly.
    Completed,
    /// Spawn, process, or logged failure.
    Failed(String),
}

/// Choice after a successful step with more steps remaining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterSuccess {
    /// Run the next planned agent.
    Continue,
    /// Replace the next planned agent with this one.
    Substitute(String),
    /// Stop without running the remaining steps.
    Pause,
}

/// Choice after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFailure {
    /// Run the same step again.
    Retry,
    /// Move on to the next step.
    Skip,
    /// Dispatch the recovery agent, then move on.
    Recover,
    /// End the sequence.
    Abort,
}

/// Decision-maker consulted between steps.
pub trait StepAdvisor: Send + Sync {
    /// Decide what follows `finished` when `next` is the planned next step.
    fn after_success<'a>(
        &'a self,
        finished: &'a str,
        next: &'a str,
        catalog: &'a AgentCatalog,
    ) -> Decision<'a, AfterSuccess>;

    /// Decide how to handle `failed` ending with `error`.
    fn after_failure<'a>(&'a self, failed: &'a str, error: &'a str) -> Decision<'a, AfterFailure>;
}

/// Live display bound to one running step.
pub trait ProgressIndicator: Send + Sync {
    /// A step is starting.
    fn start(&self, agent: &str);
    /// New progress text for the running step.
    fn update(&self, agent: &str, message: &str);
    /// The step ended.
    fn finish(&self, agent: &str, outcome: &StepOutcome);
}

/// How a sequence run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEnd {
    /// Every step was run or skipped.
    Finished,
    /// Paused after a successful step.
    Paused {
        /// Last completed agent.
        after: String,
    },
    /// Aborted after a failure.
    Aborted {
        /// Failing agent.
        agent: String,
        /// Failure text.
        error: String,
    },
}

/// Summary of one mediated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    /// Agents that completed, in order; retried agents appear once.
    pub completed: Vec<String>,
    /// Agents skipped after a failure.
    pub skipped: Vec<String>,
    /// Agents for which the recovery agent was dispatched.
    pub recovered: Vec<String>,
    /// Final state.
    pub end: SequenceEnd,
}

/// A planned step with the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// Catalog agent name.
    pub agent: String,
    /// What the step contributes.
    pub purpose: String,
}

impl PlannedStep {
    fn new(agent: &str, purpose: &str) -> Self {
        Self {
            agent: agent.to_owned(),
            purpose: purpose.to_owned(),
        }
    }
}

/// Keyword-based plan for a free-form request.
#[must_use]
pub fn suggested_sequence(description: &str) -> Vec<PlannedStep> {
    let text = description.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if mentions(&["new", "create", "build"]) {
        vec![
            PlannedStep::new("vision-challenger", "Refine and validate the feature idea"),
            PlannedStep::new("architecture-designer", "Design technical approach"),
            PlannedStep::new("task-folder-generator", "Create implementation tasks"),
            PlannedStep::new("task-executor", "Build the feature"),
        ]
    } else if mentions(&["improve", "enhance"]) {
        vec![
            PlannedStep::new("foundation-architect", "Analyze current architecture"),
            PlannedStep::new("task-executor", "Implement improvements"),
            PlannedStep::new("test-guardian", "Ensure quality gates"),
        ]
    } else {
        vec![
            PlannedStep::new("vision-challenger", "Clarify requirements"),
            PlannedStep::new("task-executor", "Execute development"),
        ]
    }
}

/// Canned workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPreset {
    /// Find and fix defects.
    Bugs,
    /// Profile and optimize.
    Performance,
    /// Extend the test suite.
    Tests,
    /// Restructure existing code.
    Refactor,
    /// Produce documentation.
    Documentation,
}

impl FromStr for WorkflowPreset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bugs" => Ok(Self::Bugs),
            "performance" => Ok(Self::Performance),
            "tests" => Ok(Self::Tests),
            "refactor" => Ok(Self::Refactor),
            "documentation" | "docs" => Ok(Self::Documentation),
            other => Err(AppError::Config(format!("unknown workflow preset: {other}"))),
        }
    }
}

impl WorkflowPreset {
    /// Steps of the preset.
    #[must_use]
    pub fn steps(self) -> Vec<PlannedStep> {
        match self {
            Self::Bugs => vec![
                PlannedStep::new("error-manager", "Identify and analyze errors"),
                PlannedStep::new("task-executor", "Fix identified issues"),
                PlannedStep::new("test-guardian", "Ensure fixes work correctly"),
            ],
            Self::Performance => vec![
                PlannedStep::new("foundation-architect", "Analyze performance bottlenecks"),
                PlannedStep::new("task-executor", "Implement optimizations"),
                PlannedStep::new("monitoring-deployer", "Set up performance monitoring"),
            ],
            Self::Tests => vec![
                PlannedStep::new("test-guardian", "Analyze test coverage"),
                PlannedStep::new("task-executor", "Add missing tests"),
                PlannedStep::new("test-guardian", "Validate test quality"),
            ],
            Self::Refactor => vec![
                PlannedStep::new("foundation-architect", "Analyze current architecture"),
                PlannedStep::new("task-folder-generator", "Plan refactoring tasks"),
                PlannedStep::new("task-executor", "Execute refactoring"),
                PlannedStep::new("test-guardian", "Ensure everything still works"),
            ],
            Self::Documentation => vec![
                PlannedStep::new("folder-documenter", "Generate comprehensive folder documentation"),
                PlannedStep::new("ai-context-builder", "Update AI context files"),
            ],
        }
    }
}

/// Drives agent lists through the manager and monitor.
pub struct SequenceExecutor {
    manager: Arc<AgentManager>,
    monitor: Arc<ProgressMonitor>,
    advisor: Arc<dyn StepAdvisor>,
    indicator: Arc<dyn ProgressIndicator>,
    project_root: PathBuf,
    recovery_agent: String,
    mode: AgentMode,
}

impl SequenceExecutor {
    /// Construct an executor that spawns steps in interactive mode.
    #[must_use]
    pub fn new(
        manager: Arc<AgentManager>,
        monitor: Arc<ProgressMonitor>,
        advisor: Arc<dyn StepAdvisor>,
        indicator: Arc<dyn ProgressIndicator>,
        project_root: PathBuf,
        recovery_agent: String,
    ) -> Self {
        Self {
            manager,
            monitor,
            advisor,
            indicator,
            project_root,
            recovery_agent,
            mode: AgentMode::Interactive,
        }
    }

    /// Spawn steps in `mode` instead.
    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `agents` in order with `context`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidAgents` if any planned name is unknown.
    /// Step failures are reported through the advisor, not as errors.
    pub async fn execute(&self, agents: Vec<String>, context: Value) -> Result<SequenceReport> {
        let invalid: Vec<String> = agents
            .iter()
            .filter(|a| !self.manager.catalog().contains(a))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(AppError::InvalidAgents(invalid));
        }

        let span = info_span!("execute_sequence", steps = agents.len());
        self.execute_steps(agents, context).instrument(span).await
    }

    async fn execute_steps(&self, mut steps: Vec<String>, context: Value) -> Result<SequenceReport> {
        let mut report = SequenceReport {
            completed: Vec::new(),
            skipped: Vec::new(),
            recovered: Vec::new(),
            end: SequenceEnd::Finished,
        };

        let mut index = 0;
        while index < steps.len() {
            let agent = steps[index].clone();
            info!(step = index + 1, total = steps.len(), agent, "running step");

            match self.run_step(&agent, json!({ "context": context })).await {
                StepOutcome::Completed => {
                    report.completed.push(agent.clone());
                    let Some(next) = steps.get(index + 1).cloned() else {
                        break;
                    };
                    match self
                        .advisor
                        .after_success(&agent, &next, self.manager.catalog())
                        .await
                    {
                        AfterSuccess::Continue => {}
                        AfterSuccess::Substitute(other) => {
                            if self.manager.catalog().contains(&other) {
                                info!(replaced = next, with = other, "next step substituted");
                                steps[index + 1] = other;
                            } else {
                                warn!(agent = other, "unknown substitute ignored");
                            }
                        }
                        AfterSuccess::Pause => {
                            info!(after = agent, "sequence paused");
                            report.end = SequenceEnd::Paused { after: agent };
                            return Ok(report);
                        }
                    }
                    index += 1;
                }
                StepOutcome::Failed(error) => {
                    match self.advisor.after_failure(&agent, &error).await {
                        AfterFailure::Retry => {
                            info!(agent, "retrying step");
                        }
                        AfterFailure::Skip => {
                            info!(agent, "step skipped");
                            report.skipped.push(agent);
                            index += 1;
                        }
                        AfterFailure::Recover => {
                            let recovery_context = json!({
                                "error": error,
                                "failedAgent": agent,
                            });
                            let outcome = self.run_step(&self.recovery_agent, recovery_context).await;
                            if let StepOutcome::Failed(recovery_error) = &outcome {
                                warn!(
                                    agent,
                                    recovery_agent = self.recovery_agent,
                                    error = recovery_error,
                                    "recovery agent failed"
                                );
                            }
                            report.recovered.push(agent);
                            index += 1;
                        }
                        AfterFailure::Abort => {
                            warn!(agent, error, "sequence aborted");
                            report.end = SequenceEnd::Aborted { agent, error };
                            return Ok(report);
                        }
                    }
                }
            }
        }

        info!(completed = report.completed.len(), "sequence finished");
        Ok(report)
    }

    /// Spawn one agent and wait for a terminal signal from either the log
    /// or the process.
    ///
    /// A clean exit after a logged error still counts as a failure. When
    /// the log reports completion first, a still-running session is stopped.
    pub async fn run_step(&self, agent: &str, context: Value) -> StepOutcome {
        self.indicator.start(agent);
        let outcome = self.monitored_run(agent, context).await;
        self.indicator.finish(agent, &outcome);
        outcome
    }

    #[allow(clippy::too_many_lines)] // Single select loop over both event streams.
    async fn monitored_run(&self, agent: &str, context: Value) -> StepOutcome {
        let mut monitor_events = self.monitor.subscribe();
        let mut agent_events = self.manager.subscribe();

        let session_id = match self.monitor.start_monitoring(agent, &self.project_root).await {
            Ok(id) => id,
            Err(err) => return StepOutcome::Failed(err.to_string()),
        };

        let instance = match self.manager.spawn_agent(agent, context, self.mode).await {
            Ok(instance) => instance,
            Err(err) => {
                self.monitor.stop_monitoring(&session_id).await;
                return StepOutcome::Failed(err.to_string());
            }
        };

        let mut logged_error: Option<String> = None;
        let outcome = loop {
            tokio::select! {
                event = monitor_events.recv() => match event {
                    Ok(event) if event.session_id() == session_id => match event {
                        MonitorEvent::Progress { entry, .. } => {
                            let text = entry
                                .progress
                                .clone()
                                .unwrap_or_else(|| entry.action.clone());
                            self.indicator.update(agent, &text);
                        }
                        MonitorEvent::Completed { .. } => {
                            if self.manager.stop_agent(&instance.id).await {
                                info!(instance_id = instance.id, "session stopped after logged completion");
                            }
                            break StepOutcome::Completed;
                        }
                        MonitorEvent::Error { entry, .. } => {
                            self.indicator.update(agent, &format!("error: {}", entry.details));
                            logged_error = Some(entry.details);
                        }
                        MonitorEvent::Stalled { idle, .. } => {
                            self.indicator
                                .update(agent, &format!("no activity for {}s", idle.as_secs()));
                        }
                        MonitorEvent::TaskStatus { current_tasks, .. } => {
                            if let Some(task) = current_tasks.first() {
                                self.indicator.update(agent, &task.progress_text());
                            }
                        }
                        MonitorEvent::Started { .. }
                        | MonitorEvent::Metrics { .. }
                        | MonitorEvent::MonitoringError { .. }
                        | MonitorEvent::MonitoringStopped { .. } => {}
                    },
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        break StepOutcome::Failed("monitor shut down".into());
                    }
                },
                event = agent_events.recv() => match event {
                    Ok(AgentEvent::Completed { instance_id, .. }) if instance_id == instance.id => {
                        break match logged_error.take() {
                            Some(error) => StepOutcome::Failed(error),
                            None => StepOutcome::Completed,
                        };
                    }
                    Ok(AgentEvent::Failed { instance_id, error, .. }) if instance_id == instance.id => {
                        break StepOutcome::Failed(error);
                    }
                    Ok(AgentEvent::Stopped { instance_id, .. }) if instance_id == instance.id => {
                        break StepOutcome::Failed(format!("{agent} was stopped"));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        break StepOutcome::Failed("agent manager shut down".into());
                    }
                },
            }
        };

        self.monitor.stop_monitoring(&session_id).await;
        outcome
    }
}
