//! Engine configuration.
//!
//! [`CoreConfig`] bundles everything the engine is constructed with: storage
//! paths, the settings defaults table, and a few tuning knobs. The knobs can be
//! overridden by an optional `core.toml` in the data root:
//!
//! ```toml
//! debounce_secs = 10
//! autosave_every_ticks = 20
//! retention_tiers_secs = [300, 600, 1200, 3600, 21600, 86400, 172800, 345600]
//! ```
//!
//! Missing keys keep their defaults; a missing file is not an error.

use std::time::Duration;

use fs_err as fs;
use serde::Deserialize;

use crate::error::{Result, TimerError};
use crate::snapshot::DEFAULT_TIERS;
use crate::state::SettingsDefaults;
use crate::storage::StorageConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);
const DEFAULT_AUTOSAVE_EVERY_TICKS: u32 = 20;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub storage: StorageConfig,
    pub settings_defaults: SettingsDefaults,
    /// Quiet period after the last change before a deferred snapshot may fire.
    pub debounce: Duration,
    pub retention_tiers: Vec<Duration>,
    /// Save the live document every N ticks. Zero disables autosave.
    pub autosave_every_ticks: u32,
}

impl CoreConfig {
    /// Built-in defaults for the given storage.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            settings_defaults: SettingsDefaults::default(),
            debounce: DEFAULT_DEBOUNCE,
            retention_tiers: DEFAULT_TIERS.to_vec(),
            autosave_every_ticks: DEFAULT_AUTOSAVE_EVERY_TICKS,
        }
    }

    /// Defaults overlaid with `core.toml`, if present.
    pub fn load(storage: StorageConfig) -> Result<Self> {
        let path = storage.core_config_file();
        let mut config = Self::new(storage);
        if !path.exists() {
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| TimerError::io("Failed to read core config", e))?;
        let overrides: CoreConfigFile =
            toml::from_str(&content).map_err(|source| TimerError::ConfigMalformed {
                path: path.clone(),
                source,
            })?;
        config.apply(overrides);
        tracing::info!(path = %path.display(), "Loaded core config overrides");
        Ok(config)
    }

    fn apply(&mut self, file: CoreConfigFile) {
        if let Some(secs) = file.debounce_secs {
            self.debounce = Duration::from_secs(secs);
        }
        if let Some(ticks) = file.autosave_every_ticks {
            self.autosave_every_ticks = ticks;
        }
        if let Some(tiers) = file.retention_tiers_secs {
            if tiers.is_empty() {
                tracing::warn!("Ignoring empty retention_tiers_secs; keeping defaults");
            } else {
                self.retention_tiers = tiers.into_iter().map(Duration::from_secs).collect();
            }
        }
    }
}

/// On-disk shape of `core.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoreConfigFile {
    #[serde(default)]
    debounce_secs: Option<u64>,
    #[serde(default)]
    autosave_every_ticks: Option<u32>,
    #[serde(default)]
    retention_tiers_secs: Option<Vec<u64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_core_toml(storage: &StorageConfig, content: &str) {
        let path = storage.core_config_file();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let config = CoreConfig::load(StorageConfig::with_root(temp.path().to_path_buf())).unwrap();
        assert_eq!(config.debounce, Duration::from_secs(10));
        assert_eq!(config.autosave_every_ticks, 20);
        assert_eq!(config.retention_tiers, DEFAULT_TIERS.to_vec());
    }

    #[test]
    fn test_partial_overrides_keep_other_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        write_core_toml(&storage, "debounce_secs = 3\nretention_tiers_secs = [60, 3600]\n");

        let config = CoreConfig::load(storage).unwrap();
        assert_eq!(config.debounce, Duration::from_secs(3));
        assert_eq!(
            config.retention_tiers,
            vec![Duration::from_secs(60), Duration::from_secs(3600)]
        );
        assert_eq!(config.autosave_every_ticks, 20);
    }

    #[test]
    fn test_empty_tier_list_is_ignored() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        write_core_toml(&storage, "retention_tiers_secs = []\n");
        let config = CoreConfig::load(storage).unwrap();
        assert_eq!(config.retention_tiers, DEFAULT_TIERS.to_vec());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        write_core_toml(&storage, "debounce_secs = \"soon\"\n");
        let err = CoreConfig::load(storage).unwrap_err();
        assert!(matches!(err, TimerError::ConfigMalformed { .. }));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        write_core_toml(&storage, "debounce = 3\n");
        assert!(CoreConfig::load(storage).is_err());
    }
}
