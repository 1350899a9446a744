//! Prompt template handed to every agent session.

use serde_json::Value;

use crate::models::agent::AgentDefinition;

/// Render the activation prompt for `agent`.
///
/// Deterministic: the same definition, context and log name always yield
/// the same text. `log_file` is the shared log name agents are told to
/// append to.
#[must_use]
pub fn build_agent_prompt(agent: &AgentDefinition, context: &Value, log_file: &str) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());

    format!(
        "You are the {name} agent in the Claude Code Agent System.

Your role: {description}

Phase: {phase}
Capabilities: {capabilities}

Context:
{context_json}

Project Files Available:
- PROJECT_MANIFESTO.md (read this first)
- {log_file} (log all your actions here)
- AGENT_COMPATIBILITY_MAP.md (repository-specific guidelines)
- TASKS/ (task management system)

CRITICAL: Follow the Agent Header Protocol:
1. Read PROJECT_MANIFESTO.md first
2. Read {log_file} second
3. Log your activation with timestamp
4. Check for conflicts with other agents
5. Execute your specialized work
6. Log all decisions and changes
7. Log completion and handoff to next agent

Log entries use the header `### <timestamp> - {name} - <ACTION>`.

Remember: You are working in an existing repository. Respect existing patterns and follow the compatibility guidelines.

Begin your work now.",
        name = agent.name,
        description = agent.description,
        phase = agent.phase,
        capabilities = agent.capabilities.join(", "),
    )
}

/// JSON payload exported to the agent through its environment.
#[must_use]
pub fn context_payload(agent: &str, instance_id: &str, context: &Value) -> String {
    serde_json::json!({
        "agent": agent,
        "instanceId": instance_id,
        "context": context,
    })
    .to_string()
}
