//! Shared project log and task-file parsing.
//!
//! Pure functions over file contents; the file-watch transport lives in
//! [`crate::monitor`].

pub mod parser;
pub mod status;
pub mod tailer;
