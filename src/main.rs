#![forbid(unsafe_code)]

//! `agent-conductor`: development agent pipeline orchestrator.
//!
//! Loads configuration, builds the agent manager and progress monitor for
//! one project, runs the requested command, and on completion or a
//! termination signal stops every agent it started.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conductor::catalog::AgentCatalog;
use agent_conductor::console::{SpinnerIndicator, TerminalAdvisor};
use agent_conductor::models::agent::AgentMode;
use agent_conductor::monitor::{MonitorEvent, MonitorSettings, ProgressMonitor};
use agent_conductor::orchestrator::dependency_gate::DependencyGate;
use agent_conductor::orchestrator::sequence_executor::{
    suggested_sequence, PlannedStep, SequenceEnd, SequenceExecutor, WorkflowPreset,
};
use agent_conductor::orchestrator::sequence_store::SequenceStore;
use agent_conductor::orchestrator::{AgentEvent, AgentManager, AgentProcessRunner, ManagerSettings};
use agent_conductor::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum ModeArg {
    Interactive,
    Automatic,
}

impl From<ModeArg> for AgentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Interactive => Self::Interactive,
            ModeArg::Automatic => Self::Automatic,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "agent-conductor", about = "Development agent pipeline orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory; overrides `project_root` from the config.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List catalog agents by phase.
    Agents,
    /// Suggest agents to run next.
    Suggest {
        /// Agent that just finished; omit for bootstrap candidates.
        #[arg(long)]
        after: Option<String>,
    },
    /// Spawn one agent and stream its output until it exits.
    Spawn {
        /// Catalog agent name.
        agent: String,
        /// JSON context handed to the agent.
        #[arg(long)]
        context: Option<String>,
        /// Runtime mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Interactive)]
        mode: ModeArg,
    },
    /// Manage stored sequences.
    Sequence {
        #[command(subcommand)]
        action: SequenceCommand,
    },
    /// Run agents one at a time, asking what to do between steps.
    Run {
        /// Explicit agent list, comma separated.
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        /// Canned workflow: bugs, performance, tests, refactor, documentation.
        #[arg(long)]
        preset: Option<WorkflowPreset>,
        /// Free-form request used to pick a plan and passed as context.
        #[arg(long)]
        description: Option<String>,
        /// Spawn steps as one-shot processes instead of terminal sessions.
        #[arg(long)]
        automatic: bool,
    },
    /// Print monitor events for an agent until it logs completion.
    Monitor {
        /// Catalog agent name.
        agent: String,
    },
}

#[derive(Debug, Subcommand)]
enum SequenceCommand {
    /// Define a sequence.
    Create {
        /// Sequence name.
        name: String,
        /// Agents in run order.
        #[arg(required = true)]
        agents: Vec<String>,
    },
    /// Run a stored sequence unattended in automatic mode.
    Run {
        /// Sequence name.
        name: String,
        /// JSON context handed to every agent.
        #[arg(long)]
        context: Option<String>,
    },
    /// List stored sequences.
    List,
}

/// Long-lived services shared by every command.
struct App {
    config: GlobalConfig,
    manager: Arc<AgentManager>,
    monitor: Arc<ProgressMonitor>,
}

impl App {
    fn build(config: GlobalConfig) -> Result<Self> {
        let catalog = Arc::new(AgentCatalog::builtin());
        let gate = DependencyGate::new(config.log_path());
        let log_file = config.files.log.display().to_string();
        let runner = AgentProcessRunner::new(
            config.runtime.clone(),
            config.project_root.clone(),
            log_file,
            config.timing.settle_delay(),
        );
        let store = SequenceStore::load(config.sequences_path())?;
        let loaded = store.iter().count();

        let manager = AgentManager::new(
            catalog,
            gate,
            Arc::new(runner),
            store,
            ManagerSettings {
                poll_interval: config.timing.poll_interval(),
                eviction: config.timing.eviction(),
            },
        );
        let monitor = ProgressMonitor::new(
            config.files.clone(),
            MonitorSettings {
                heartbeat: config.timing.heartbeat(),
                stall_threshold: config.timing.stall_threshold(),
            },
        );

        info!(
            project = %config.project_root.display(),
            sequences = loaded,
            "orchestrator ready"
        );

        Ok(Self {
            config,
            manager: Arc::new(manager),
            monitor: Arc::new(monitor),
        })
    }

    /// Release every external resource owned by this process.
    async fn shutdown(&self) {
        let stopped = self.manager.stop_all_agents().await;
        self.monitor.stop_all_monitoring().await;
        self.manager.shutdown().await;
        info!(stopped, "shutdown complete");
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(args.config.as_ref(), args.project.as_ref())?;
    let app = App::build(config)?;

    let outcome = tokio::select! {
        result = execute(&app, args.command) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    app.shutdown().await;
    outcome
}

fn load_config(path: Option<&PathBuf>, project: Option<&PathBuf>) -> Result<GlobalConfig> {
    let mut config = match path {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(project) = project {
        config.project_root.clone_from(project);
    }
    config.validate()?;
    Ok(config)
}

async fn execute(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Agents => {
            list_agents(app.manager.catalog());
            Ok(())
        }
        Command::Suggest { after } => {
            suggest(app.manager.catalog(), after.as_deref());
            Ok(())
        }
        Command::Spawn {
            agent,
            context,
            mode,
        } => spawn_and_stream(app, &agent, parse_context(context.as_deref())?, mode.into()).await,
        Command::Sequence { action } => match action {
            SequenceCommand::Create { name, agents } => {
                let sequence = app.manager.create_sequence(&name, &agents).await?;
                println!("{} {}", style("Created").green(), sequence.description);
                Ok(())
            }
            SequenceCommand::Run { name, context } => {
                app.manager
                    .run_sequence(&name, parse_context(context.as_deref())?)
                    .await?;
                println!("{} sequence {name} completed", style("✓").green());
                Ok(())
            }
            SequenceCommand::List => {
                for sequence in app.manager.list_sequences().await {
                    println!(
                        "{}  {}  ({})",
                        style(&sequence.name).bold(),
                        sequence.agents.join(" → "),
                        sequence.created.format("%Y-%m-%d %H:%M")
                    );
                }
                Ok(())
            }
        },
        Command::Run {
            agents,
            preset,
            description,
            automatic,
        } => run_interactive(app, agents, preset, description, automatic).await,
        Command::Monitor { agent } => monitor_agent(app, &agent).await,
    }
}

fn parse_context(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| AppError::Config(format!("context is not valid JSON: {err}"))),
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

fn list_agents(catalog: &AgentCatalog) {
    for def in catalog.all() {
        let deps = if def.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (after {})", def.dependencies.join(", "))
        };
        println!(
            "{:>3}  {}  {}{}",
            def.phase,
            style(&def.name).cyan(),
            def.description,
            style(deps).dim()
        );
    }
}

fn suggest(catalog: &AgentCatalog, after: Option<&str>) {
    let suggestions = catalog.suggest_next(after);
    if suggestions.is_empty() {
        println!("No suggestions.");
        return;
    }
    for def in suggestions {
        println!("{}  {}", style(&def.name).cyan(), def.description);
    }
}

async fn spawn_and_stream(app: &App, agent: &str, context: Value, mode: AgentMode) -> Result<()> {
    let mut events = app.manager.subscribe();
    let instance = app.manager.spawn_agent(agent, context, mode).await?;
    println!(
        "{} {} ({})",
        style("Spawned").green(),
        style(agent).bold(),
        instance.id
    );

    loop {
        match events.recv().await {
            Ok(AgentEvent::Output {
                instance_id, data, ..
            }) if instance_id == instance.id => {
                print!("{data}");
                let _ = std::io::stdout().flush();
            }
            Ok(AgentEvent::Error {
                instance_id, error, ..
            }) if instance_id == instance.id => eprint!("{}", style(error).red()),
            Ok(AgentEvent::Completed { instance_id, .. }) if instance_id == instance.id => {
                println!("\n{} {agent} completed", style("✓").green());
                return Ok(());
            }
            Ok(AgentEvent::Failed { instance_id, .. }) if instance_id == instance.id => {
                return app.manager.wait_for_completion(&instance.id).await;
            }
            Ok(AgentEvent::Stopped { instance_id, .. }) if instance_id == instance.id => {
                println!("\n{agent} stopped");
                return Ok(());
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "output events dropped"),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

async fn run_interactive(
    app: &App,
    agents: Vec<String>,
    preset: Option<WorkflowPreset>,
    description: Option<String>,
    automatic: bool,
) -> Result<()> {
    let plan: Vec<PlannedStep> = if !agents.is_empty() {
        agents
            .into_iter()
            .map(|agent| {
                let purpose = app
                    .manager
                    .catalog()
                    .get(&agent)
                    .map(|d| d.description.clone())
                    .unwrap_or_default();
                PlannedStep { agent, purpose }
            })
            .collect()
    } else if let Some(preset) = preset {
        preset.steps()
    } else if let Some(description) = description.as_deref() {
        suggested_sequence(description)
    } else {
        return Err(AppError::Config(
            "run needs --agents, --preset, or --description".into(),
        ));
    };

    println!("{}", style("Planned agent sequence").bold());
    for (index, step) in plan.iter().enumerate() {
        println!(
            "{}. {}\n   ↳ {}",
            style(index + 1).cyan(),
            style(&step.agent).bold(),
            step.purpose
        );
    }

    let mode = if automatic {
        AgentMode::Automatic
    } else {
        AgentMode::Interactive
    };
    let executor = SequenceExecutor::new(
        Arc::clone(&app.manager),
        Arc::clone(&app.monitor),
        Arc::new(TerminalAdvisor),
        Arc::new(SpinnerIndicator::new()),
        app.config.project_root.clone(),
        app.config.recovery_agent.clone(),
    )
    .with_mode(mode);

    let context = Value::String(description.unwrap_or_default());
    let report = executor
        .execute(plan.into_iter().map(|s| s.agent).collect(), context)
        .await?;

    match report.end {
        SequenceEnd::Finished => println!("{} agent sequence completed", style("✓").green()),
        SequenceEnd::Paused { after } => println!("Paused after {after}"),
        SequenceEnd::Aborted { agent, error } => {
            println!("{} stopped at {agent}: {error}", style("✗").red());
        }
    }
    Ok(())
}

async fn monitor_agent(app: &App, agent: &str) -> Result<()> {
    if !app.manager.catalog().contains(agent) {
        return Err(AppError::AgentNotFound(agent.to_owned()));
    }

    let mut events = app.monitor.subscribe();
    let session_id = app
        .monitor
        .start_monitoring(agent, &app.config.project_root)
        .await?;
    println!("Monitoring {} ({session_id})", style(agent).bold());

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "monitor events dropped");
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };
        if event.session_id() != session_id {
            continue;
        }

        match event {
            MonitorEvent::Progress { entry, .. } => {
                if let Some(line) = app.monitor.format_progress(&session_id).await {
                    println!("{line}");
                }
                println!("  {} {}", style(&entry.action).cyan(), entry.details);
            }
            MonitorEvent::Error { entry, .. } => {
                println!("{} {}", style("error:").red(), entry.details);
            }
            MonitorEvent::Stalled { idle, .. } => {
                println!(
                    "{} no activity for {}s",
                    style("stalled:").yellow(),
                    idle.as_secs()
                );
            }
            MonitorEvent::TaskStatus { summary, .. } => {
                println!(
                    "tasks {} {}/{}",
                    ProgressMonitor::progress_bar(summary.completed, summary.total_tasks, 20),
                    summary.completed,
                    summary.total_tasks
                );
            }
            MonitorEvent::Metrics { metrics, .. } => {
                if let Some(velocity) = metrics.velocity {
                    println!("velocity {velocity}");
                }
            }
            MonitorEvent::MonitoringError { file, error, .. } => {
                println!("{} {}: {error}", style("warning:").yellow(), file.display());
            }
            MonitorEvent::Completed { elapsed, .. } => {
                println!(
                    "{} {agent} completed after {}s",
                    style("✓").green(),
                    elapsed.as_secs()
                );
                return Ok(());
            }
            MonitorEvent::MonitoringStopped { .. } => return Ok(()),
            MonitorEvent::Started { .. } => {}
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
