//! Error types for timer-core operations.
//!
//! Only failures the host must hear about are represented here. A malformed
//! state file or an undeletable snapshot is absorbed and logged where it happens.

use std::path::PathBuf;

/// All errors that can occur in timer-core operations.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Could not determine a data directory for client timer state")]
    DataDirNotFound,

    #[error("Configuration file malformed: {path}: {source}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to install log subscriber: {0}")]
    LoggingInit(String),

    // ─────────────────────────────────────────────────────────────────────
    // Document Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unknown row: {0}")]
    UnknownRow(i64),

    #[error("Row {0} is not a timer")]
    NotATimer(i64),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TimerError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TimerError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        TimerError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using TimerError.
pub type Result<T> = std::result::Result<T, TimerError>;

// Hosts usually just show the message.
impl From<TimerError> for String {
    fn from(err: TimerError) -> String {
        err.to_string()
    }
}
