//! Agent process runner.
//!
//! Launches the external agent runtime for one instance, forwards its
//! output as [`RunnerEvent`]s, and reports how the process ended. Two
//! handle kinds exist: a one-shot child process fed through piped stdin
//! (automatic mode) and a pseudo-terminal session that receives the
//! prompt after a settle delay (interactive mode).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::RuntimeConfig;
use crate::models::agent::{AgentDefinition, AgentMode, ExitReport};
use crate::orchestrator::prompt;
use crate::{AppError, Result};

/// Upper bound on waiting for output readers after the process exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Read buffer size for output forwarding.
const CHUNK_SIZE: usize = 8192;

/// Raw notifications from a running agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// Chunk of standard output (or terminal output).
    Output {
        /// Instance that produced the chunk.
        instance_id: String,
        /// Lossily decoded text.
        data: String,
    },
    /// Chunk of standard error (automatic mode only).
    Stderr {
        /// Instance that produced the chunk.
        instance_id: String,
        /// Lossily decoded text.
        data: String,
    },
    /// The process ended.
    Exited {
        /// Instance whose process ended.
        instance_id: String,
        /// Exit code and signal.
        report: ExitReport,
    },
}

/// Channel the runner reports into.
pub type RunnerEventSender = mpsc::UnboundedSender<RunnerEvent>;

/// Everything needed to start one agent instance.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    /// Instance identifier, exported to the agent.
    pub instance_id: &'a str,
    /// Catalog definition of the agent.
    pub definition: &'a AgentDefinition,
    /// Opaque context payload.
    pub context: &'a Value,
    /// Runtime mode.
    pub mode: AgentMode,
    /// Destination for output and exit notifications.
    pub events: RunnerEventSender,
}

/// Process id plus a kill switch for platforms without signals.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: Option<u32>,
    kill: CancellationToken,
}

impl ProcessControl {
    /// Wrap a process id.
    #[must_use]
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            kill: CancellationToken::new(),
        }
    }

    /// OS process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn kill_switch(&self) -> CancellationToken {
        self.kill.clone()
    }

    #[cfg(unix)]
    fn deliver(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let pid = self
            .pid
            .ok_or_else(|| AppError::Stop("process id unavailable".into()))?;
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Stop(format!("process id {pid} out of range")))?;
        kill(Pid::from_raw(raw), signal)
            .map_err(|err| AppError::Stop(format!("failed to signal process {pid}: {err}")))
    }

    #[cfg(not(unix))]
    fn request_kill(&self) -> Result<()> {
        self.kill.cancel();
        Ok(())
    }
}

/// Live handle to a launched agent.
#[derive(Debug, Clone)]
pub enum AgentHandle {
    /// One-shot child process with piped streams.
    Process(ProcessControl),
    /// Pseudo-terminal session.
    Terminal(ProcessControl),
}

impl AgentHandle {
    /// OS process id of the agent runtime.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process(control) | Self::Terminal(control) => control.pid(),
        }
    }
}

/// Seam between the agent manager and process management.
pub trait AgentLauncher: Send + Sync {
    /// Start the runtime for `request` and return a handle.
    ///
    /// Output and the eventual exit are reported through `request.events`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the process or session cannot start.
    fn launch<'a>(
        &'a self,
        request: LaunchRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<AgentHandle>> + Send + 'a>>;

    /// Send the termination signal suited to the handle kind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stop` if the signal could not be delivered.
    fn stop(&self, handle: &AgentHandle) -> Result<()>;
}

/// Launches the configured agent runtime as real OS processes.
#[derive(Debug, Clone)]
pub struct AgentProcessRunner {
    runtime: RuntimeConfig,
    workdir: PathBuf,
    log_file: String,
    settle_delay: Duration,
}

impl AgentProcessRunner {
    /// Construct a runner.
    ///
    /// * `workdir`: directory the agent starts in (the project root).
    /// * `log_file`: shared log name quoted in the prompt.
    /// * `settle_delay`: wait before writing the prompt to a terminal session.
    #[must_use]
    pub fn new(
        runtime: RuntimeConfig,
        workdir: PathBuf,
        log_file: String,
        settle_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            workdir,
            log_file,
            settle_delay,
        }
    }

    fn base_command(&self, args: &[String], payload: &str) -> Command {
        let mut cmd = Command::new(&self.runtime.program);
        cmd.args(args)
            .env(&self.runtime.context_env, payload)
            .current_dir(&self.workdir)
            .kill_on_drop(true);
        cmd
    }

    async fn launch_automatic(&self, request: LaunchRequest<'_>) -> Result<AgentHandle> {
        let prompt =
            prompt::build_agent_prompt(request.definition, request.context, &self.log_file);
        let payload = prompt::context_payload(
            &request.definition.name,
            request.instance_id,
            request.context,
        );

        let mut cmd = self.base_command(&self.runtime.automatic_args, &payload);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!("failed to spawn {}: {err}", self.runtime.program))
        })?;
        let pid = child.id();

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture agent stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture agent stderr".into()))?;

        let instance_id = request.instance_id.to_owned();
        let readers = vec![
            tokio::spawn(forward_stream(
                stdout,
                instance_id.clone(),
                request.events.clone(),
                StreamKind::Output,
            )),
            tokio::spawn(forward_stream(
                stderr,
                instance_id.clone(),
                request.events.clone(),
                StreamKind::Stderr,
            )),
        ];

        // A runtime that exits before reading stdin is reported through its
        // exit status, not as a launch failure.
        if let Err(err) = stdin.write_all(format!("{prompt}\n").as_bytes()).await {
            warn!(instance_id, %err, "failed to write prompt to agent stdin");
        }
        drop(stdin);

        let control = ProcessControl::new(pid);
        tokio::spawn(watch_exit(
            child,
            instance_id.clone(),
            request.events,
            control.kill_switch(),
            readers,
        ));

        info!(instance_id, pid = pid.unwrap_or(0), "automatic agent process spawned");
        Ok(AgentHandle::Process(control))
    }

    #[cfg(unix)]
    async fn launch_interactive(&self, request: LaunchRequest<'_>) -> Result<AgentHandle> {
        let prompt =
            prompt::build_agent_prompt(request.definition, request.context, &self.log_file);
        let payload = prompt::context_payload(
            &request.definition.name,
            request.instance_id,
            request.context,
        );

        let mut cmd = self.base_command(&self.runtime.interactive_args, &payload);
        cmd.env("TERM", "xterm-color");

        let session = super::pty::TerminalSession::open(
            cmd,
            self.runtime.terminal_cols,
            self.runtime.terminal_rows,
        )?;
        let pid = session.child.id();
        let instance_id = request.instance_id.to_owned();

        let reader = tokio::spawn(forward_stream(
            session.reader,
            instance_id.clone(),
            request.events.clone(),
            StreamKind::Output,
        ));

        let mut writer = session.writer;
        let settle = self.settle_delay;
        let prompt_id = instance_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let written = match writer.write_all(format!("{prompt}\n").as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(err) => Err(err),
            };
            match written {
                Ok(()) => debug!(instance_id = prompt_id, "prompt written to terminal session"),
                Err(err) => warn!(instance_id = prompt_id, %err, "failed to write prompt to terminal"),
            }
        });

        let control = ProcessControl::new(pid);
        tokio::spawn(watch_exit(
            session.child,
            instance_id.clone(),
            request.events,
            control.kill_switch(),
            vec![reader],
        ));

        info!(instance_id, pid = pid.unwrap_or(0), "interactive agent session spawned");
        Ok(AgentHandle::Terminal(control))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_async)] // Mirrors the unix signature.
    async fn launch_interactive(&self, _request: LaunchRequest<'_>) -> Result<AgentHandle> {
        Err(AppError::Launch(
            "interactive sessions require a unix pseudo-terminal".into(),
        ))
    }
}

impl AgentLauncher for AgentProcessRunner {
    fn launch<'a>(
        &'a self,
        request: LaunchRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<AgentHandle>> + Send + 'a>> {
        let span = info_span!(
            "launch_agent",
            agent = %request.definition.name,
            instance_id = request.instance_id,
            mode = ?request.mode,
        );

        Box::pin(
            async move {
                match request.mode {
                    AgentMode::Interactive => self.launch_interactive(request).await,
                    AgentMode::Automatic => self.launch_automatic(request).await,
                }
            }
            .instrument(span),
        )
    }

    fn stop(&self, handle: &AgentHandle) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            match handle {
                AgentHandle::Process(control) => control.deliver(Signal::SIGTERM),
                AgentHandle::Terminal(control) => control.deliver(Signal::SIGHUP),
            }
        }

        #[cfg(not(unix))]
        {
            match handle {
                AgentHandle::Process(control) | AgentHandle::Terminal(control) => {
                    control.request_kill()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Output,
    Stderr,
}

/// Forward every chunk read from `stream` until EOF or a read error.
///
/// A pseudo-terminal master reports `EIO` once the session closes; that
/// simply ends the loop.
async fn forward_stream<R>(
    mut stream: R,
    instance_id: String,
    events: RunnerEventSender,
    kind: StreamKind,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = vec![0_u8; CHUNK_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                let instance_id = instance_id.clone();
                let event = match kind {
                    StreamKind::Output => RunnerEvent::Output { instance_id, data },
                    StreamKind::Stderr => RunnerEvent::Stderr { instance_id, data },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(instance_id, %err, "agent output stream closed");
                break;
            }
        }
    }
}

/// Await process exit, drain output readers, and report the exit.
async fn watch_exit(
    mut child: Child,
    instance_id: String,
    events: RunnerEventSender,
    kill: CancellationToken,
    readers: Vec<JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => {
            if let Err(err) = child.start_kill() {
                warn!(instance_id, %err, "failed to kill agent process");
            }
            child.wait().await
        }
    };

    for reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN, reader).await.is_err() {
            debug!(instance_id, "output reader still open after exit");
        }
    }

    let report = match status {
        Ok(status) => exit_report(status),
        Err(err) => {
            warn!(instance_id, %err, "error waiting for agent process");
            ExitReport {
                code: None,
                signal: None,
            }
        }
    };

    info!(
        instance_id,
        code = ?report.code,
        signal = ?report.signal,
        "agent process exited"
    );

    if events
        .send(RunnerEvent::Exited {
            instance_id: instance_id.clone(),
            report,
        })
        .is_err()
    {
        warn!(instance_id, "runner channel closed before exit could be reported");
    }
}

fn exit_report(status: ExitStatus) -> ExitReport {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitReport {
        code: status.code(),
        signal,
    }
}
