//! JSON-backed store of named agent sequences.
//!
//! The file is a single object keyed by sequence name:
//! `{"<name>": {"name", "agents", "description", "created"}}`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::models::sequence::AgentSequence;
use crate::{AppError, Result};

/// In-memory copy of the sequence file, written back on every change.
#[derive(Debug, Clone)]
pub struct SequenceStore {
    path: PathBuf,
    sequences: BTreeMap<String, AgentSequence>,
}

impl SequenceStore {
    /// An empty store that will persist to `path`.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequences: BTreeMap::new(),
        }
    }

    /// Load the store at `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parse` if the file exists but is not a valid
    /// sequence map, or `AppError::Io` if it cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no sequence store yet");
                return Ok(Self::empty(path));
            }
            Err(err) => return Err(err.into()),
        };

        let sequences = serde_json::from_str(&raw).map_err(|err| AppError::Parse {
            file: path.display().to_string(),
            message: err.to_string(),
        })?;

        Ok(Self { path, sequences })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a sequence by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AgentSequence> {
        self.sequences.get(name)
    }

    /// All sequences ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &AgentSequence> {
        self.sequences.values()
    }

    /// Insert or replace `sequence` and persist the whole store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written; the in-memory
    /// store is left unchanged in that case.
    pub fn insert(&mut self, sequence: AgentSequence) -> Result<()> {
        let mut next = self.sequences.clone();
        next.insert(sequence.name.clone(), sequence);
        Self::write(&self.path, &next)?;
        self.sequences = next;
        Ok(())
    }

    fn write(path: &Path, sequences: &BTreeMap<String, AgentSequence>) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_string_pretty(sequences)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body)?;
        fs::rename(&staging, path)?;

        info!(path = %path.display(), count = sequences.len(), "sequence store saved");
        Ok(())
    }
}
