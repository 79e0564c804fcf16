//! Storage configuration and path management for Client Timer.
//!
//! Every path the engine touches is decided here and handed to components at
//! construction, so tests can point the whole engine at a temp directory.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   current/state.json        live state document (overwritten on save)
//!   snapshots/state_*.json    tiered, pruned backups
//!   completed_sessions/       permanent per-day session records
//!   logs/                     rolling log files
//!   core.toml                 optional engine tuning
//!   old/config.txt            oldest legacy format (read once, never written)
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, TimerError};

const APP_DIR_NAME: &str = "ClientTimer2";
const LEGACY_APP_DIR_NAME: &str = "ICOMM Client Timer";

/// Central configuration for all Client Timer storage paths.
///
/// Production code uses [`StorageConfig::from_platform`]; tests use
/// [`StorageConfig::with_root`] for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all current-format data.
    root: PathBuf,
    /// Directory holding the two-file legacy format (`config.json` + `recent_save.json`).
    legacy_root: PathBuf,
}

impl StorageConfig {
    /// Resolves the platform data directory (falls back to the home directory).
    pub fn from_platform() -> Result<Self> {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or(TimerError::DataDirNotFound)?;
        let legacy_base = dirs::config_dir().unwrap_or_else(|| base.clone());
        Ok(Self {
            root: base.join(APP_DIR_NAME),
            legacy_root: legacy_base.join(LEGACY_APP_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Legacy files are looked up under `<root>/legacy`.
    pub fn with_root(root: PathBuf) -> Self {
        let legacy_root = root.join("legacy");
        Self { root, legacy_root }
    }

    /// Creates a StorageConfig with both a custom root and legacy root.
    pub fn with_roots(root: PathBuf, legacy_root: PathBuf) -> Self {
        Self { root, legacy_root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn legacy_root(&self) -> &Path {
        &self.legacy_root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Current Format
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directory holding the live state document.
    pub fn current_dir(&self) -> PathBuf {
        self.root.join("current")
    }

    /// Path to the live state document.
    pub fn state_file(&self) -> PathBuf {
        self.current_dir().join("state.json")
    }

    /// Directory of pruned, timestamped snapshots.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// Directory of completed sessions. Never pruned.
    pub fn completed_sessions_dir(&self) -> PathBuf {
        self.root.join("completed_sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Optional engine tuning file.
    pub fn core_config_file(&self) -> PathBuf {
        self.root.join("core.toml")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Legacy Format (read-only)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Legacy settings + row list.
    pub fn legacy_config_file(&self) -> PathBuf {
        self.legacy_root.join("config.json")
    }

    /// Legacy "today's times" file.
    pub fn legacy_times_file(&self) -> PathBuf {
        self.legacy_root.join("recent_save.json")
    }

    /// Line-based config from the first generation of the app.
    pub fn legacy_line_config_file(&self) -> PathBuf {
        self.root.join("old").join("config.txt")
    }
}
