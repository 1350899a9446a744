//! Named agent sequence model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ordered list of agents run back-to-back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSequence {
    /// Unique sequence name.
    pub name: String,
    /// Agent names in execution order.
    pub agents: Vec<String>,
    /// Human-readable summary.
    pub description: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
}

impl AgentSequence {
    /// Construct a sequence with the default `Custom sequence: a → b` description.
    #[must_use]
    pub fn new(name: String, agents: Vec<String>) -> Self {
        let description = format!("Custom sequence: {}", agents.join(" → "));
        Self {
            name,
            agents,
            description,
            created: Utc::now(),
        }
    }
}
