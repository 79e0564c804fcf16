//! # timer-core
//!
//! Persistence and retention engine for Client Timer: per-row elapsed timers,
//! the live state document, tiered snapshots, and daily session rollover.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One host tick drives everything.
//! - **Monotonic durations**: Elapsed time comes from [`std::time::Instant`];
//!   wall-clock timestamps are only persisted, never subtracted.
//! - **Graceful degradation**: A missing or damaged state file yields defaults,
//!   not errors. Only failed writes are reported.
//! - **Injected paths**: Every component takes its directories from
//!   [`StorageConfig`], so tests run against a temp directory.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use timer_core::{CoreConfig, StorageConfig, TimerEngine};
//!
//! let config = CoreConfig::load(StorageConfig::from_platform()?)?;
//! let mut engine = TimerEngine::open(config);
//! let id = engine.add_row("ACME", timer_core::RowKind::Timer)?;
//! engine.start(id)?;
//! loop {
//!     let report = engine.tick();
//!     // show report.errors, sleep one second
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod timer;

pub use config::CoreConfig;
pub use engine::{TickReport, TimerEngine, APP_EXIT_REASON, DAILY_RESET_REASON, LAYOUT_CHANGE_REASON};
pub use error::{Result, TimerError};
pub use logging::init_logging;
pub use session::{due_boundary, most_recent_boundary, SessionFinalizer};
pub use snapshot::*;
pub use state::{
    now_local, parse_timestamp, Layout, LoadOutcome, LoadSource, Meta, Row, RowKind, Session,
    Settings, SettingsDefaults, SnapshotPriority, StateDocument, StateStore, TrackedTime,
    SCHEMA_VERSION,
};
pub use storage::StorageConfig;
pub use timer::ElapsedTimer;
