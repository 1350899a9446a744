//! File-change transport for monitoring sessions.
//!
//! Each session watches the parent directories of its files with `notify`
//! and forwards matching create/modify events into an `mpsc` channel. The
//! watch is released when the returned [`FileWatch`] is dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Which well-known project file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedFile {
    /// Shared project log.
    Log,
    /// Task status JSON.
    Status,
    /// Task metrics JSON.
    Metrics,
}

/// One change notification for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Session that registered the watch.
    pub session_id: String,
    /// File that changed.
    pub file: WatchedFile,
}

/// Keeps a session's OS watch alive.
pub struct FileWatch {
    _watcher: RecommendedWatcher,
    targets: Vec<PathBuf>,
}

impl fmt::Debug for FileWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatch")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl FileWatch {
    /// Resolved paths under watch.
    #[must_use]
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }
}

/// Start watching `targets` on behalf of `session_id`.
///
/// Files need not exist yet, but their parent directories must.
///
/// # Errors
///
/// Returns `AppError::Io` if a parent directory cannot be resolved or the
/// OS watch cannot be registered.
pub fn watch_files(
    session_id: &str,
    targets: &[(PathBuf, WatchedFile)],
    changes: mpsc::UnboundedSender<FileChange>,
) -> Result<FileWatch> {
    let mut resolved: Vec<(PathBuf, WatchedFile)> = Vec::with_capacity(targets.len());
    let mut dirs: Vec<PathBuf> = Vec::new();

    for (path, file) in targets {
        let (dir, name) = split_target(path)?;
        resolved.push((dir.join(name), *file));
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    let session = session_id.to_owned();
    let matchers = resolved.clone();
    let mut watcher = notify::recommended_watcher(
        move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) => {
                for file in changed_files(&event, &matchers) {
                    let change = FileChange {
                        session_id: session.clone(),
                        file,
                    };
                    if changes.send(change).is_err() {
                        debug!(session_id = session, "change receiver gone");
                        return;
                    }
                }
            }
            Err(err) => warn!(%err, "file watcher error"),
        },
    )
    .map_err(|err| AppError::Io(format!("failed to create watcher: {err}")))?;

    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|err| AppError::Io(format!("failed to watch {}: {err}", dir.display())))?;
    }

    Ok(FileWatch {
        _watcher: watcher,
        targets: resolved.into_iter().map(|(path, _)| path).collect(),
    })
}

fn split_target(path: &Path) -> Result<(PathBuf, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .ok_or_else(|| AppError::Io(format!("cannot watch {}: no file name", path.display())))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent
        .canonicalize()
        .map_err(|err| AppError::Io(format!("cannot watch {}: {err}", parent.display())))?;
    Ok((dir, name))
}

/// Targets touched by a create or modify event, each reported once.
fn changed_files(event: &Event, targets: &[(PathBuf, WatchedFile)]) -> Vec<WatchedFile> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }

    targets
        .iter()
        .filter(|(path, _)| event.paths.iter().any(|p| p == path))
        .map(|(_, file)| *file)
        .collect()
}
