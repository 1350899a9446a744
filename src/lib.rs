#![forbid(unsafe_code)]

//! Agent pipeline orchestration.
//!
//! Spawns development agents as external processes, gates each spawn on
//! the completion markers its dependencies wrote to the shared project
//! log, and derives live progress by tailing that log.

pub mod catalog;
pub mod config;
pub mod console;
pub mod errors;
pub mod journal;
pub mod models;
pub mod monitor;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
