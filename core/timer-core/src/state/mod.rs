//! The persisted state document.
//!
//! One JSON document (`current/state.json`) holds everything needed to bring
//! the app back exactly where it was: metadata, the row layout, settings, and
//! the current session's per-row elapsed times.
//!
//! # Module Structure
//!
//! - [`types`]: document types and the settings defaults table
//! - [`validate`]: section-by-section repair of a loosely typed document
//! - [`migrate`]: one-shot import from the legacy formats
//! - [`store`]: load/save with atomic writes
//!
//! # Key Entry Points
//!
//! - [`StateStore::load`]: never fails; degrades to defaults
//! - [`StateStore::save`]: stamps `saved_at` and overwrites the file

pub mod migrate;
pub mod store;
pub mod types;
pub mod validate;

pub(crate) use store::write_json_atomic;
pub use store::{LoadOutcome, LoadSource, StateStore};
pub use types::{
    now_local, parse_timestamp, Layout, Meta, Row, RowKind, Session, Settings, SettingsDefaults,
    SnapshotPriority, StateDocument, TrackedTime, SCHEMA_VERSION,
};
pub use validate::{repair, Repaired};
