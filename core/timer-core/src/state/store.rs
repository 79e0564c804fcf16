//! File-backed persistence of the live state document.
//!
//! # Loading
//!
//! Loading never fails. In order:
//!
//! 1. No state file: migrate from a legacy format if one exists, otherwise start
//!    fresh. Either way the result is written immediately as the canonical file.
//! 2. Unreadable file (I/O error, empty, bad JSON, non-object top level): start
//!    fresh. The unreadable history is lost but the app still starts.
//! 3. Parsed file: repair section by section (see [`super::validate`]) and log
//!    which fields were defaulted.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write cannot leave a truncated file.

use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::migrate::migrate_legacy;
use super::types::{now_local, SettingsDefaults, StateDocument};
use super::validate::{repair, Repaired};
use crate::error::{Result, TimerError};
use crate::storage::StorageConfig;

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Parsed from the existing state file (possibly with repairs).
    Existing,
    /// Built from a legacy format because no state file existed.
    Migrated,
    /// No state file and no legacy data.
    Fresh,
    /// A state file existed but could not be read or parsed.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub document: StateDocument,
    pub source: LoadSource,
    /// Dotted paths of fields replaced by defaults (only for [`LoadSource::Existing`]).
    pub defaulted: Vec<String>,
}

/// Reads and writes `current/state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    storage: StorageConfig,
    defaults: SettingsDefaults,
}

impl StateStore {
    pub fn new(storage: StorageConfig, defaults: SettingsDefaults) -> Self {
        Self { storage, defaults }
    }

    pub fn path(&self) -> PathBuf {
        self.storage.state_file()
    }

    pub fn defaults(&self) -> &SettingsDefaults {
        &self.defaults
    }

    pub fn load(&self) -> LoadOutcome {
        let path = self.path();
        let now = now_local();

        if !path.exists() {
            let (mut document, source) =
                match migrate_legacy(&self.storage, &self.defaults, now) {
                    Some(document) => (document, LoadSource::Migrated),
                    None => {
                        tracing::info!(path = %path.display(), "No state file found; starting fresh");
                        (StateDocument::fresh(&self.defaults, now), LoadSource::Fresh)
                    }
                };
            if let Err(err) = self.save(&mut document) {
                tracing::warn!(error = %err, "Failed to persist initial state document");
            }
            return LoadOutcome {
                document,
                source,
                defaulted: Vec::new(),
            };
        }

        match self.read_repaired() {
            Ok(Some(repaired)) => {
                if repaired.is_clean() {
                    tracing::info!(path = %path.display(), "Loaded state document");
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        defaulted = %repaired.defaulted.join(", "),
                        "Loaded state document with missing values that were defaulted"
                    );
                }
                LoadOutcome {
                    document: repaired.document,
                    source: LoadSource::Existing,
                    defaulted: repaired.defaulted,
                }
            }
            Ok(None) => {
                tracing::warn!(path = %path.display(), "State document is not a JSON object; starting fresh");
                self.recovered(now)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load state document; starting fresh");
                self.recovered(now)
            }
        }
    }

    /// Reads and repairs the state file without writing anything.
    ///
    /// `Ok(None)` means the file parsed but was not an object.
    pub fn read_repaired(&self) -> Result<Option<Repaired>> {
        let path = self.path();
        let content = fs::read_to_string(&path)
            .map_err(|e| TimerError::io("Failed to read state file", e))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            TimerError::json(format!("Failed to parse {}", path.display()), e)
        })?;
        Ok(repair(value, &self.defaults, now_local()))
    }

    /// Stamps `meta.saved_at` and overwrites the state file.
    pub fn save(&self, document: &mut StateDocument) -> Result<()> {
        document.meta.saved_at = now_local();
        let path = self.path();
        write_json_atomic(&path, document)?;
        tracing::debug!(path = %path.display(), "Saved state document");
        Ok(())
    }

    fn recovered(&self, now: chrono::DateTime<chrono::FixedOffset>) -> LoadOutcome {
        LoadOutcome {
            document: StateDocument::fresh(&self.defaults, now),
            source: LoadSource::Recovered,
            defaulted: Vec::new(),
        }
    }
}

/// Pretty-prints `value` to `path` via a temp file in the same directory.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent_dir = path.parent().ok_or_else(|| TimerError::WriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;
    fs::create_dir_all(parent_dir)
        .map_err(|e| TimerError::io("Failed to create directory", e))?;

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| TimerError::json(format!("Failed to serialize {}", path.display()), e))?;

    let write_failed = |source: std::io::Error| TimerError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(write_failed)?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(write_failed)?;
    temp_file.flush().map_err(write_failed)?;
    temp_file
        .persist(path)
        .map_err(|e| write_failed(e.error))?;
    Ok(())
}
