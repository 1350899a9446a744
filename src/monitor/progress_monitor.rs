//! Log-derived progress tracking for running agents.
//!
//! A session follows one agent through the shared project files. Log
//! changes are re-scanned in full and only entries with unseen timestamps
//! are delivered; status and metrics files are re-parsed on change. A
//! heartbeat marks quiet `Active` sessions as `Stalled`, the only hang
//! detection available since agents send no liveness pings.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ProjectFiles;
use crate::journal::status;
use crate::journal::tailer::LogTailer;
use crate::models::instance_id;
use crate::models::journal::LogEntry;
use crate::models::monitoring::{MonitorStatus, MonitoringSession};
use crate::models::tasks::{ActiveTask, MetricsSnapshot, TaskSummary};
use crate::monitor::watcher::{self, FileChange, FileWatch, WatchedFile};
use crate::Result;

/// Capacity of the monitor event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Signals published by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Session created.
    Started {
        /// New session.
        session_id: String,
        /// Monitored agent.
        agent: String,
    },
    /// A new log entry was delivered.
    Progress {
        /// Owning session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Delivered entry.
        entry: LogEntry,
        /// Session status after applying the entry.
        status: MonitorStatus,
    },
    /// Agent logged completion or handoff; the session has ended.
    Completed {
        /// Finished session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Entry that carried the marker.
        entry: LogEntry,
        /// Time since the session started.
        elapsed: Duration,
    },
    /// Agent logged an error; monitoring continues.
    Error {
        /// Owning session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Entry describing the error.
        entry: LogEntry,
    },
    /// Active session went quiet past the stall threshold.
    Stalled {
        /// Owning session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Time since the last observed activity.
        idle: Duration,
    },
    /// Status file re-parsed.
    TaskStatus {
        /// Owning session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Project-wide counts.
        summary: TaskSummary,
        /// Active tasks assigned to this agent.
        current_tasks: Vec<ActiveTask>,
    },
    /// Metrics file re-parsed; fields are forwarded verbatim.
    Metrics {
        /// Owning session.
        session_id: String,
        /// Monitored agent.
        agent: String,
        /// Decoded metrics.
        metrics: MetricsSnapshot,
    },
    /// A watched file could not be read or parsed.
    MonitoringError {
        /// Owning session.
        session_id: String,
        /// Offending file.
        file: PathBuf,
        /// Failure description.
        error: String,
    },
    /// Session removed.
    MonitoringStopped {
        /// Removed session.
        session_id: String,
        /// Monitored agent.
        agent: String,
    },
}

impl MonitorEvent {
    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Started { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Error { session_id, .. }
            | Self::Stalled { session_id, .. }
            | Self::TaskStatus { session_id, .. }
            | Self::Metrics { session_id, .. }
            | Self::MonitoringError { session_id, .. }
            | Self::MonitoringStopped { session_id, .. } => session_id,
        }
    }
}

/// Heartbeat cadence and stall threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Interval between stall checks.
    pub heartbeat: Duration,
    /// Inactivity after which an `Active` session is stalled.
    pub stall_threshold: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            stall_threshold: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    session: MonitoringSession,
    tailer: LogTailer,
    log_path: PathBuf,
    status_path: PathBuf,
    metrics_path: PathBuf,
    /// Monotonic twin of `session.last_activity` used for stall checks.
    last_activity: Instant,
    _watch: Option<FileWatch>,
}

impl SessionState {
    fn path_for(&self, file: WatchedFile) -> PathBuf {
        match file {
            WatchedFile::Log => self.log_path.clone(),
            WatchedFile::Status => self.status_path.clone(),
            WatchedFile::Metrics => self.metrics_path.clone(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.session.last_activity = Utc::now();
    }
}

/// Session table plus event sender, shared with background tasks.
#[derive(Debug)]
struct Shared {
    sessions: Mutex<HashMap<String, SessionState>>,
    events: broadcast::Sender<MonitorEvent>,
}

impl Shared {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.events.send(event);
    }

    async fn handle_change(&self, session_id: &str, file: WatchedFile) {
        let path = {
            let mut sessions = self.sessions.lock().await;
            let Some(state) = sessions.get_mut(session_id) else {
                return;
            };
            state.touch();
            state.path_for(file)
        };

        let read = tokio::fs::read_to_string(&path).await;

        let mut sessions = self.sessions.lock().await;
        let Some(state) = sessions.get_mut(session_id) else {
            return;
        };

        let content = match read {
            Ok(content) => content,
            Err(err) => {
                warn!(session_id, file = %path.display(), %err, "failed to read watched file");
                self.emit(MonitorEvent::MonitoringError {
                    session_id: session_id.to_owned(),
                    file: path,
                    error: format!("failed to read file: {err}"),
                });
                return;
            }
        };

        let finished = match file {
            WatchedFile::Log => self.apply_log(state, &content),
            WatchedFile::Status => {
                self.apply_status(state, &path, &content);
                false
            }
            WatchedFile::Metrics => {
                self.apply_metrics(state, &path, &content);
                false
            }
        };

        if finished {
            if let Some(state) = sessions.remove(session_id) {
                info!(session_id, agent = state.session.agent_name, "monitoring finished");
                self.emit(MonitorEvent::MonitoringStopped {
                    session_id: session_id.to_owned(),
                    agent: state.session.agent_name,
                });
            }
        }
    }

    /// Deliver new entries; returns `true` once completion was seen.
    fn apply_log(&self, state: &mut SessionState, content: &str) -> bool {
        let session_id = state.session.id.clone();
        let agent = state.session.agent_name.clone();

        for entry in state.tailer.take_new(content) {
            if let Some(progress) = &entry.progress {
                state.session.progress = Some(progress.clone());
            }

            let next = MonitorStatus::for_entry(&entry);
            if state.session.status != next && !state.session.transition(next) {
                debug!(
                    session_id,
                    from = %state.session.status,
                    to = %next,
                    "status transition ignored"
                );
            }

            self.emit(MonitorEvent::Progress {
                session_id: session_id.clone(),
                agent: agent.clone(),
                entry: entry.clone(),
                status: state.session.status,
            });

            match next {
                MonitorStatus::Completed => {
                    let elapsed = (Utc::now() - state.session.start_time)
                        .to_std()
                        .unwrap_or_default();
                    info!(session_id, agent, action = entry.action, "agent logged completion");
                    self.emit(MonitorEvent::Completed {
                        session_id,
                        agent,
                        entry,
                        elapsed,
                    });
                    return true;
                }
                MonitorStatus::Error => {
                    warn!(session_id, agent, details = entry.details, "agent logged an error");
                    self.emit(MonitorEvent::Error {
                        session_id: session_id.clone(),
                        agent: agent.clone(),
                        entry,
                    });
                }
                MonitorStatus::Starting | MonitorStatus::Active | MonitorStatus::Stalled => {}
            }
        }

        false
    }

    fn apply_status(&self, state: &mut SessionState, path: &Path, content: &str) {
        let session_id = state.session.id.clone();
        match status::parse_status_file(path, content) {
            Ok(parsed) => {
                let current_tasks: Vec<ActiveTask> =
                    status::tasks_for_agent(&parsed, &state.session.agent_name)
                        .into_iter()
                        .cloned()
                        .collect();
                if let Some(task) = current_tasks.first() {
                    state.session.progress = Some(task.progress_text());
                }
                self.emit(MonitorEvent::TaskStatus {
                    session_id,
                    agent: state.session.agent_name.clone(),
                    summary: parsed.summary,
                    current_tasks,
                });
            }
            Err(err) => {
                warn!(session_id, %err, "status file parse failed");
                self.emit(MonitorEvent::MonitoringError {
                    session_id,
                    file: path.to_owned(),
                    error: err.to_string(),
                });
            }
        }
    }

    fn apply_metrics(&self, state: &SessionState, path: &Path, content: &str) {
        let session_id = state.session.id.clone();
        match status::parse_metrics_file(path, content) {
            Ok(metrics) => self.emit(MonitorEvent::Metrics {
                session_id,
                agent: state.session.agent_name.clone(),
                metrics,
            }),
            Err(err) => {
                warn!(session_id, %err, "metrics file parse failed");
                self.emit(MonitorEvent::MonitoringError {
                    session_id,
                    file: path.to_owned(),
                    error: err.to_string(),
                });
            }
        }
    }

    async fn check_for_stalled(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let mut stalled = 0;

        for state in sessions.values_mut() {
            if state.session.status != MonitorStatus::Active {
                continue;
            }
            let idle = now.saturating_duration_since(state.last_activity);
            if idle > threshold && state.session.transition(MonitorStatus::Stalled) {
                stalled += 1;
                info!(
                    session_id = state.session.id,
                    agent = state.session.agent_name,
                    idle_secs = idle.as_secs(),
                    "agent stalled"
                );
                self.emit(MonitorEvent::Stalled {
                    session_id: state.session.id.clone(),
                    agent: state.session.agent_name.clone(),
                    idle,
                });
            }
        }

        stalled
    }
}

/// Tracks monitoring sessions and publishes [`MonitorEvent`]s.
pub struct ProgressMonitor {
    shared: Arc<Shared>,
    files: ProjectFiles,
    settings: MonitorSettings,
    changes: mpsc::UnboundedSender<FileChange>,
    heartbeat_cancel: CancellationToken,
    dispatch_cancel: CancellationToken,
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.heartbeat_cancel.cancel();
        self.dispatch_cancel.cancel();
    }
}

impl ProgressMonitor {
    /// Construct a monitor and start its heartbeat and change dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(files: ProjectFiles, settings: MonitorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            sessions: Mutex::new(HashMap::new()),
            events,
        });
        let (changes, changes_rx) = mpsc::unbounded_channel();
        let heartbeat_cancel = CancellationToken::new();
        let dispatch_cancel = CancellationToken::new();

        tokio::spawn(
            run_heartbeat(Arc::clone(&shared), settings, heartbeat_cancel.clone())
                .instrument(info_span!("monitor_heartbeat")),
        );
        tokio::spawn(
            dispatch_changes(Arc::clone(&shared), changes_rx, dispatch_cancel.clone())
                .instrument(info_span!("monitor_dispatch")),
        );

        Self {
            shared,
            files,
            settings,
            changes,
            heartbeat_cancel,
            dispatch_cancel,
        }
    }

    /// Subscribe to monitor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    /// Start following `agent` in the project at `project_path`.
    ///
    /// The log is always watched; the status and metrics files only if they
    /// exist now. Entries already in the log are recorded as delivered so
    /// that only activity from this run is reported.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file watch cannot be registered.
    pub async fn start_monitoring(&self, agent: &str, project_path: &Path) -> Result<String> {
        let session_id = instance_id(agent);
        let span = info_span!("start_monitoring", agent, session_id);
        self.register_session(agent, project_path, session_id)
            .instrument(span)
            .await
    }

    async fn register_session(
        &self,
        agent: &str,
        project_path: &Path,
        session_id: String,
    ) -> Result<String> {
        let log_path = project_path.join(&self.files.log);
        let status_path = project_path.join(&self.files.status);
        let metrics_path = project_path.join(&self.files.metrics);

        let mut targets = vec![(log_path.clone(), WatchedFile::Log)];
        if matches!(tokio::fs::try_exists(&status_path).await, Ok(true)) {
            targets.push((status_path.clone(), WatchedFile::Status));
        }
        if matches!(tokio::fs::try_exists(&metrics_path).await, Ok(true)) {
            targets.push((metrics_path.clone(), WatchedFile::Metrics));
        }

        let watch = watcher::watch_files(&session_id, &targets, self.changes.clone())?;

        let mut tailer = LogTailer::new(agent);
        match tokio::fs::read_to_string(&log_path).await {
            Ok(history) => {
                let seen = tailer.take_new(&history).len();
                debug!(seen, "existing log entries recorded as history");
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(%err, "failed to read existing log"),
        }

        let mut session =
            MonitoringSession::new(session_id.clone(), agent.to_owned(), project_path.to_owned());
        session.files_watched = watch.targets().to_vec();

        self.shared.sessions.lock().await.insert(
            session_id.clone(),
            SessionState {
                session,
                tailer,
                log_path,
                status_path,
                metrics_path,
                last_activity: Instant::now(),
                _watch: Some(watch),
            },
        );

        info!(files = targets.len(), "monitoring started");
        self.shared.emit(MonitorEvent::Started {
            session_id: session_id.clone(),
            agent: agent.to_owned(),
        });

        Ok(session_id)
    }

    /// React to a change of one watched file.
    ///
    /// Called by the watch dispatcher; read and parse failures become
    /// `MonitoringError` events and never end the session.
    pub async fn handle_file_change(&self, session_id: &str, file: WatchedFile) {
        self.shared.handle_change(session_id, file).await;
    }

    /// Run one stall check now; returns how many sessions became stalled.
    pub async fn check_for_stalled(&self) -> usize {
        self.shared
            .check_for_stalled(self.settings.stall_threshold)
            .await
    }

    /// Cancel a session's watch and remove it.
    pub async fn stop_monitoring(&self, session_id: &str) -> bool {
        let Some(state) = self.shared.sessions.lock().await.remove(session_id) else {
            return false;
        };
        info!(session_id, agent = state.session.agent_name, "monitoring stopped");
        self.shared.emit(MonitorEvent::MonitoringStopped {
            session_id: session_id.to_owned(),
            agent: state.session.agent_name,
        });
        true
    }

    /// Stop every session and the heartbeat.
    pub async fn stop_all_monitoring(&self) {
        let ids: Vec<String> = self.shared.sessions.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_monitoring(&id).await;
        }
        self.heartbeat_cancel.cancel();
    }

    /// Most recent unfinished session for `agent`.
    pub async fn active_session(&self, agent: &str) -> Option<MonitoringSession> {
        self.shared
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.session.agent_name == agent)
            .filter(|s| s.session.status != MonitorStatus::Completed)
            .max_by_key(|s| s.session.start_time)
            .map(|s| s.session.clone())
    }

    /// Every live session, oldest first.
    pub async fn all_sessions(&self) -> Vec<MonitoringSession> {
        let mut sessions: Vec<MonitoringSession> = self
            .shared
            .sessions
            .lock()
            .await
            .values()
            .map(|s| s.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    /// Snapshot of one session.
    pub async fn session(&self, session_id: &str) -> Option<MonitoringSession> {
        self.shared
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| s.session.clone())
    }

    /// One-line summary: `[mm:ss] agent: progress`, falling back to status.
    pub async fn format_progress(&self, session_id: &str) -> Option<String> {
        let session = self.session(session_id).await?;
        let elapsed = (Utc::now() - session.start_time).num_seconds().max(0);
        let detail = session
            .progress
            .unwrap_or_else(|| session.status.to_string());
        Some(format!(
            "[{:02}:{:02}] {}: {detail}",
            elapsed / 60,
            elapsed % 60,
            session.agent_name
        ))
    }

    /// Text progress bar of `width` cells.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )] // Ratio is clamped to [0, 1] before scaling.
    pub fn progress_bar(completed: u64, total: u64, width: usize) -> String {
        if total == 0 {
            return "□".repeat(width);
        }
        let ratio = (completed as f64 / total as f64).min(1.0);
        let filled = ((ratio * width as f64).floor() as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }
}

async fn run_heartbeat(shared: Arc<Shared>, settings: MonitorSettings, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(settings.heartbeat.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("heartbeat cancelled");
                return;
            }
            _ = ticker.tick() => {
                shared.check_for_stalled(settings.stall_threshold).await;
            }
        }
    }
}

async fn dispatch_changes(
    shared: Arc<Shared>,
    mut changes: mpsc::UnboundedReceiver<FileChange>,
    cancel: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            () = cancel.cancelled() => return,
            change = changes.recv() => change,
        };
        let Some(change) = change else {
            return;
        };
        shared.handle_change(&change.session_id, change.file).await;
    }
}
