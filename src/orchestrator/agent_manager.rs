//! Agent lifecycle management.
//!
//! The manager owns the instance table. It refuses spawns whose
//! dependencies have not logged completion, launches the runtime through
//! an [`AgentLauncher`], folds runner notifications into instance state,
//! and evicts finished instances after a fixed retention window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::catalog::AgentCatalog;
use crate::models::agent::{AgentInstance, AgentMode, ExitReport, InstanceStatus};
use crate::models::instance_id;
use crate::models::sequence::AgentSequence;
use crate::orchestrator::dependency_gate::DependencyGate;
use crate::orchestrator::runner::{
    AgentHandle, AgentLauncher, LaunchRequest, RunnerEvent, RunnerEventSender,
};
use crate::orchestrator::sequence_store::SequenceStore;
use crate::{AppError, Result};

/// Capacity of the lifecycle event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications published by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Process or session launched.
    Spawned {
        /// New instance.
        instance_id: String,
        /// Agent name.
        agent: String,
        /// Runtime mode.
        mode: AgentMode,
    },
    /// Output chunk from the agent.
    Output {
        /// Producing instance.
        instance_id: String,
        /// Agent name.
        agent: String,
        /// Text chunk.
        data: String,
    },
    /// Error text from the agent or from a failed stop; not terminal.
    Error {
        /// Affected instance.
        instance_id: String,
        /// Agent name.
        agent: String,
        /// Error text.
        error: String,
    },
    /// Process exited with code 0.
    Completed {
        /// Finished instance.
        instance_id: String,
        /// Agent name.
        agent: String,
    },
    /// Process exited unsuccessfully.
    Failed {
        /// Failed instance.
        instance_id: String,
        /// Agent name.
        agent: String,
        /// Exit description naming the code and signal.
        error: String,
    },
    /// Instance stopped by the orchestrator.
    Stopped {
        /// Stopped instance.
        instance_id: String,
        /// Agent name.
        agent: String,
    },
    /// Finished instance removed from the table.
    Evicted {
        /// Removed instance.
        instance_id: String,
    },
}

/// Timing knobs for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Interval between status checks in [`AgentManager::wait_for_completion`].
    pub poll_interval: Duration,
    /// Time a finished instance stays in the table.
    pub eviction: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            eviction: Duration::from_secs(60),
        }
    }
}

/// Instance record plus its live handle, if any.
#[derive(Debug)]
struct TrackedInstance {
    instance: AgentInstance,
    handle: Option<AgentHandle>,
}

type InstanceTable = Arc<Mutex<HashMap<String, TrackedInstance>>>;

/// Orchestrates spawn requests, instance lifecycle, and named sequences.
pub struct AgentManager {
    catalog: Arc<AgentCatalog>,
    gate: DependencyGate,
    launcher: Arc<dyn AgentLauncher>,
    instances: InstanceTable,
    sequences: Mutex<SequenceStore>,
    events: broadcast::Sender<AgentEvent>,
    runner_tx: RunnerEventSender,
    settings: ManagerSettings,
    cancel: CancellationToken,
}

impl Drop for AgentManager {
    /// Stop the runner event pump.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AgentManager {
    /// Construct a manager and start its runner event pump.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        catalog: Arc<AgentCatalog>,
        gate: DependencyGate,
        launcher: Arc<dyn AgentLauncher>,
        sequences: SequenceStore,
        settings: ManagerSettings,
    ) -> Self {
        let (runner_tx, runner_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let instances: InstanceTable = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(
            pump_runner_events(
                runner_rx,
                Arc::clone(&instances),
                events.clone(),
                settings.eviction,
                cancel.clone(),
            )
            .instrument(info_span!("runner_event_pump")),
        );

        Self {
            catalog,
            gate,
            launcher,
            instances,
            sequences: Mutex::new(sequences),
            events,
            runner_tx,
            settings,
            cancel,
        }
    }

    /// The agent catalog.
    #[must_use]
    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Spawn `name` with `context` in `mode`.
    ///
    /// Dependencies are checked one at a time in declaration order. A
    /// failed launch leaves no entry in the instance table.
    ///
    /// # Errors
    ///
    /// - `AppError::AgentNotFound` if `name` is not in the catalog.
    /// - `AppError::DependencyUnmet` naming the first dependency without a
    ///   completion marker; no process is launched.
    /// - `AppError::Launch` if the runtime could not be started.
    pub async fn spawn_agent(
        &self,
        name: &str,
        context: Value,
        mode: AgentMode,
    ) -> Result<AgentInstance> {
        let span = info_span!("spawn_agent", agent = name, ?mode);
        self.spawn_agent_inner(name, context, mode)
            .instrument(span)
            .await
    }

    async fn spawn_agent_inner(
        &self,
        name: &str,
        context: Value,
        mode: AgentMode,
    ) -> Result<AgentInstance> {
        let definition = self
            .catalog
            .get(name)
            .ok_or_else(|| AppError::AgentNotFound(name.to_owned()))?;

        if let Some(dependency) = self.gate.first_unmet(&definition.dependencies).await {
            warn!(dependency, "spawn refused: dependency has not completed");
            return Err(AppError::DependencyUnmet {
                agent: name.to_owned(),
                dependency: dependency.to_owned(),
            });
        }

        let id = instance_id(name);
        let instance = AgentInstance::new(id.clone(), name.to_owned(), context.clone(), mode);
        self.instances.lock().await.insert(
            id.clone(),
            TrackedInstance {
                instance,
                handle: None,
            },
        );

        let request = LaunchRequest {
            instance_id: &id,
            definition,
            context: &context,
            mode,
            events: self.runner_tx.clone(),
        };

        let handle = match self.launcher.launch(request).await {
            Ok(handle) => handle,
            Err(err) => {
                self.instances.lock().await.remove(&id);
                error!(instance_id = id, %err, "agent launch failed");
                return Err(err);
            }
        };

        let snapshot = {
            let mut table = self.instances.lock().await;
            let tracked = table
                .get_mut(&id)
                .ok_or_else(|| AppError::InstanceNotFound(id.clone()))?;
            // The process may already have exited and been recorded.
            if tracked.instance.status == InstanceStatus::Starting {
                tracked.instance.status = InstanceStatus::Running;
                tracked.handle = Some(handle);
            }
            tracked.instance.clone()
        };

        info!(instance_id = id, "agent spawned");
        let _ = self.events.send(AgentEvent::Spawned {
            instance_id: id,
            agent: name.to_owned(),
            mode,
        });

        Ok(snapshot)
    }

    /// Stop a live instance.
    ///
    /// Returns `false` if the instance is unknown, has no live handle, or
    /// the termination signal could not be delivered (an `Error` event is
    /// published in that case). A stopped instance is removed at once.
    pub async fn stop_agent(&self, instance_id: &str) -> bool {
        let mut table = self.instances.lock().await;

        let Some(tracked) = table.get(instance_id) else {
            return false;
        };
        let Some(handle) = tracked.handle.as_ref() else {
            return false;
        };
        let agent = tracked.instance.name.clone();

        if let Err(err) = self.launcher.stop(handle) {
            warn!(instance_id, %err, "failed to stop agent");
            let _ = self.events.send(AgentEvent::Error {
                instance_id: instance_id.to_owned(),
                agent,
                error: format!("Failed to stop agent: {err}"),
            });
            return false;
        }

        if let Some(mut removed) = table.remove(instance_id) {
            removed.instance.status = InstanceStatus::Stopped;
            removed.instance.finished_at = Some(Utc::now());
        }
        drop(table);

        info!(instance_id, agent, "agent stopped");
        let _ = self.events.send(AgentEvent::Stopped {
            instance_id: instance_id.to_owned(),
            agent,
        });
        true
    }

    /// Best-effort stop of every tracked instance; returns how many stopped.
    pub async fn stop_all_agents(&self) -> usize {
        let ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        let mut stopped = 0;
        for id in ids {
            if self.stop_agent(&id).await {
                stopped += 1;
            }
        }
        stopped
    }

    /// Instances in `Starting` or `Running` status, oldest first.
    pub async fn get_active_agents(&self) -> Vec<AgentInstance> {
        let table = self.instances.lock().await;
        let mut active: Vec<AgentInstance> = table
            .values()
            .filter(|t| t.instance.status.is_active())
            .map(|t| t.instance.clone())
            .collect();
        active.sort_by_key(|i| i.start_time);
        active
    }

    /// Snapshot of one tracked instance.
    pub async fn instance(&self, instance_id: &str) -> Option<AgentInstance> {
        self.instances
            .lock()
            .await
            .get(instance_id)
            .map(|t| t.instance.clone())
    }

    /// Wait until the instance completes, polling its status.
    ///
    /// # Errors
    ///
    /// - `AppError::ProcessExit` if the instance ended in `Error`.
    /// - `AppError::InstanceNotFound` if the instance is unknown, was
    ///   stopped, or was evicted while waiting.
    pub async fn wait_for_completion(&self, instance_id: &str) -> Result<()> {
        loop {
            {
                let table = self.instances.lock().await;
                let tracked = table
                    .get(instance_id)
                    .ok_or_else(|| AppError::InstanceNotFound(instance_id.to_owned()))?;

                match tracked.instance.status {
                    InstanceStatus::Completed => return Ok(()),
                    InstanceStatus::Error => {
                        let report = tracked.instance.exit.unwrap_or(ExitReport {
                            code: None,
                            signal: None,
                        });
                        return Err(AppError::ProcessExit {
                            agent: tracked.instance.name.clone(),
                            code: report.code,
                            signal: report.signal,
                        });
                    }
                    InstanceStatus::Stopped => {
                        return Err(AppError::InstanceNotFound(instance_id.to_owned()));
                    }
                    InstanceStatus::Starting | InstanceStatus::Running => {}
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Define and persist a named sequence.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidAgents` listing every unknown name, or
    /// `AppError::Io` if the store cannot be written.
    pub async fn create_sequence(&self, name: &str, agents: &[String]) -> Result<AgentSequence> {
        let invalid: Vec<String> = agents
            .iter()
            .filter(|a| !self.catalog.contains(a))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(AppError::InvalidAgents(invalid));
        }

        let sequence = AgentSequence::new(name.to_owned(), agents.to_vec());
        self.sequences.lock().await.insert(sequence.clone())?;
        info!(sequence = name, agents = agents.len(), "sequence created");
        Ok(sequence)
    }

    /// Look up a stored sequence.
    pub async fn sequence(&self, name: &str) -> Option<AgentSequence> {
        self.sequences.lock().await.get(name).cloned()
    }

    /// All stored sequences ordered by name.
    pub async fn list_sequences(&self) -> Vec<AgentSequence> {
        self.sequences.lock().await.iter().cloned().collect()
    }

    /// Run a stored sequence unattended, in order, in automatic mode.
    ///
    /// The first spawn or wait failure aborts the whole run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SequenceNotFound`, or `AppError::SequenceAborted`
    /// naming the failing agent and wrapping the underlying error.
    pub async fn run_sequence(&self, name: &str, context: Value) -> Result<()> {
        let sequence = self
            .sequence(name)
            .await
            .ok_or_else(|| AppError::SequenceNotFound(name.to_owned()))?;

        let span = info_span!("run_sequence", sequence = name);
        async {
            let total = sequence.agents.len();
            for (step, agent) in sequence.agents.iter().enumerate() {
                info!(step = step + 1, total, agent, "starting sequence step");
                let abort = |source: AppError| AppError::SequenceAborted {
                    agent: agent.clone(),
                    source: Box::new(source),
                };

                let instance = self
                    .spawn_agent(agent, context.clone(), AgentMode::Automatic)
                    .await
                    .map_err(abort)?;
                self.wait_for_completion(&instance.id)
                    .await
                    .map_err(abort)?;

                info!(step = step + 1, agent, "sequence step completed");
            }
            info!("sequence completed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Stop every instance and the event pump.
    pub async fn shutdown(&self) {
        let stopped = self.stop_all_agents().await;
        self.cancel.cancel();
        info!(stopped, "agent manager shut down");
    }
}

/// Apply runner notifications to the instance table until cancelled.
async fn pump_runner_events(
    mut rx: mpsc::UnboundedReceiver<RunnerEvent>,
    instances: InstanceTable,
    events: broadcast::Sender<AgentEvent>,
    eviction: Duration,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                debug!("runner event pump cancelled");
                return;
            }
            event = rx.recv() => event,
        };

        let Some(event) = event else {
            return;
        };

        apply_runner_event(event, &instances, &events, eviction).await;
    }
}

async fn apply_runner_event(
    event: RunnerEvent,
    instances: &InstanceTable,
    events: &broadcast::Sender<AgentEvent>,
    eviction: Duration,
) {
    let mut table = instances.lock().await;

    match event {
        RunnerEvent::Output { instance_id, data } => {
            let Some(tracked) = table.get_mut(&instance_id) else {
                return;
            };
            tracked.instance.output.push(data.clone());
            let agent = tracked.instance.name.clone();
            let _ = events.send(AgentEvent::Output {
                instance_id,
                agent,
                data,
            });
        }
        RunnerEvent::Stderr { instance_id, data } => {
            let Some(tracked) = table.get_mut(&instance_id) else {
                return;
            };
            tracked.instance.error = Some(data.clone());
            let agent = tracked.instance.name.clone();
            let _ = events.send(AgentEvent::Error {
                instance_id,
                agent,
                error: data,
            });
        }
        RunnerEvent::Exited {
            instance_id,
            report,
        } => {
            let Some(tracked) = table.get_mut(&instance_id) else {
                debug!(instance_id, "exit for untracked instance ignored");
                return;
            };
            if tracked.instance.status.is_terminal() {
                return;
            }

            let agent = tracked.instance.name.clone();
            tracked.handle = None;
            tracked.instance.exit = Some(report);
            tracked.instance.finished_at = Some(Utc::now());

            if report.success() {
                tracked.instance.status = InstanceStatus::Completed;
                info!(instance_id, agent, "agent completed");
                let _ = events.send(AgentEvent::Completed {
                    instance_id: instance_id.clone(),
                    agent,
                });
            } else {
                let message = AppError::ProcessExit {
                    agent: agent.clone(),
                    code: report.code,
                    signal: report.signal,
                }
                .to_string();
                tracked.instance.status = InstanceStatus::Error;
                tracked.instance.error = Some(message.clone());
                warn!(instance_id, agent, error = %message, "agent failed");
                let _ = events.send(AgentEvent::Failed {
                    instance_id: instance_id.clone(),
                    agent,
                    error: message,
                });
            }
            drop(table);

            tokio::spawn(evict_after(
                Arc::clone(instances),
                instance_id,
                eviction,
                events.clone(),
            ));
        }
    }
}

/// Remove a finished instance once the retention window has elapsed.
async fn evict_after(
    instances: InstanceTable,
    instance_id: String,
    eviction: Duration,
    events: broadcast::Sender<AgentEvent>,
) {
    tokio::time::sleep(eviction).await;

    let removed = {
        let mut table = instances.lock().await;
        let finished = table
            .get(&instance_id)
            .is_some_and(|t| t.instance.status.is_terminal());
        finished && table.remove(&instance_id).is_some()
    };

    if removed {
        debug!(instance_id, "finished instance evicted");
        let _ = events.send(AgentEvent::Evicted { instance_id });
    }
}
