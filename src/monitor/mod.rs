//! Progress monitoring built on the shared project files.

pub mod progress_monitor;
pub mod watcher;

pub use progress_monitor::{MonitorEvent, MonitorSettings, ProgressMonitor};
