//! Log subscriber setup for hosts.
//!
//! The library only emits `tracing` events. A host that wants them on disk
//! calls [`init_logging`] once at startup and keeps the returned guard alive
//! until exit; dropping it flushes the background writer.

use std::env;
use std::path::Path;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, TimerError};

const LOG_FILE_PREFIX: &str = "client-timer.log";
const DEBUG_ENV_VAR: &str = "CLIENT_TIMER_DEBUG_LOG";

/// Installs a global subscriber writing to a daily-rolling file in `logs_dir`.
///
/// `CLIENT_TIMER_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG` is
/// honored, defaulting to `info`.
pub fn init_logging(logs_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(logs_dir)
        .map_err(|e| TimerError::io("Failed to create logs directory", e))?;
    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(non_blocking)
        .try_init()
        .map_err(|err| TimerError::LoggingInit(err.to_string()))?;
    Ok(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV_VAR)
        .map(|value| is_truthy(&value))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}
