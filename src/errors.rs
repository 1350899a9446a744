//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested agent name is not in the catalog.
    AgentNotFound(String),
    /// A declared dependency has not logged completion yet.
    DependencyUnmet {
        /// Agent whose spawn was refused.
        agent: String,
        /// First dependency (in declaration order) lacking a completion marker.
        dependency: String,
    },
    /// Sequence definition names agents missing from the catalog.
    InvalidAgents(Vec<String>),
    /// Requested sequence name is not in the store.
    SequenceNotFound(String),
    /// Instance id is unknown or was already evicted.
    InstanceNotFound(String),
    /// The external agent runtime could not be started.
    Launch(String),
    /// The agent process ended unsuccessfully.
    ProcessExit {
        /// Agent name of the failed instance.
        agent: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Terminating signal number, if any.
        signal: Option<i32>,
    },
    /// A monitored file could not be read or decoded.
    Parse {
        /// File that failed to parse.
        file: String,
        /// Underlying failure description.
        message: String,
    },
    /// Termination signal could not be delivered.
    Stop(String),
    /// An automatic sequence run stopped at the named agent.
    SequenceAborted {
        /// Agent at which the sequence stopped.
        agent: String,
        /// Underlying failure.
        source: Box<AppError>,
    },
}

fn describe(value: Option<i32>) -> String {
    value.map_or_else(|| "none".to_owned(), |v| v.to_string())
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::AgentNotFound(name) => write!(f, "agent not found: {name}"),
            Self::DependencyUnmet { agent, dependency } => write!(
                f,
                "missing dependency: {dependency} must complete before {agent}"
            ),
            Self::InvalidAgents(names) => write!(f, "invalid agents: {}", names.join(", ")),
            Self::SequenceNotFound(name) => write!(f, "sequence not found: {name}"),
            Self::InstanceNotFound(id) => write!(f, "instance not found: {id}"),
            Self::Launch(msg) => write!(f, "launch failed: {msg}"),
            Self::ProcessExit {
                agent,
                code,
                signal,
            } => write!(
                f,
                "{agent} process exited with code {}, signal {}",
                describe(*code),
                describe(*signal)
            ),
            Self::Parse { file, message } => write!(f, "failed to parse {file}: {message}"),
            Self::Stop(msg) => write!(f, "stop failed: {msg}"),
            Self::SequenceAborted { agent, source } => {
                write!(f, "sequence failed at {agent}: {source}")
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SequenceAborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}
