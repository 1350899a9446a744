//! Agent orchestration.
//!
//! Covers dependency gating, process launching, instance lifecycle,
//! sequence persistence, and mediated sequence execution.

pub mod agent_manager;
pub mod dependency_gate;
pub mod prompt;
#[cfg(unix)]
mod pty;
pub mod runner;
pub mod sequence_executor;
pub mod sequence_store;

pub use agent_manager::{AgentEvent, AgentManager, ManagerSettings};
pub use runner::{AgentHandle, AgentLauncher, AgentProcessRunner};
