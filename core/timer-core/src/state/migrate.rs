//! One-shot migration from the legacy on-disk formats.
//!
//! Two generations are understood:
//!
//! - **Two-file JSON** (`config.json` + `recent_save.json`): settings and a row
//!   list in one file, today's per-row seconds in the other. Rows are either
//!   plain strings (a leading `#` marks a group header) or already row records.
//! - **Line config** (`config.txt`): `> key = value` lines from the first
//!   release. Only consulted when `config.json` is absent.
//!
//! Nothing here writes; the caller persists the migrated document.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use fs_err as fs;
use serde_json::{Map, Value};

use super::types::{Row, RowKind, SettingsDefaults, StateDocument, TrackedTime};
use crate::storage::StorageConfig;

const GROUP_MARKER: char = '#';

/// Legacy keys that carry over to the settings table unchanged.
const CARRIED_SETTINGS: &[&str] = &[
    "theme",
    "size",
    "font",
    "label_align",
    "client_separators",
    "show_group_count",
    "show_group_time",
    "always_on_top",
    "confirm_delete",
    "confirm_reset",
    "daily_reset_enabled",
    "daily_reset_time",
];

/// Old theme names mapped to their closest current equivalent.
const THEME_APPROXIMATIONS: &[(&str, &str)] = &[
    ("Classic Light", "Cupertino Light"),
    ("Classic Dark", "Galaxy Dark"),
    ("Cimply Blue", "Cimply Premier"),
    ("Twilight TMA", "ICOMM Blues"),
    ("Black Herizons", "Black Herizons"),
    ("Pretty In Pink-Mobile", "T-Magentle"),
    ("Nothing-Else-In-Stock Green", "Park In The Forest"),
    ("50 Shades Of Teams Popups", "Dialpad At Dusk"),
    ("Unavailable: Orange Getup", "ICOMM Blues"),
];

/// Builds a document from whichever legacy format is present, if any.
pub fn migrate_legacy(
    storage: &StorageConfig,
    defaults: &SettingsDefaults,
    now: DateTime<FixedOffset>,
) -> Option<StateDocument> {
    let config_path = storage.legacy_config_file();
    if config_path.exists() {
        match read_json(&config_path) {
            Some(Value::Object(config)) => {
                let times = read_json(&storage.legacy_times_file())
                    .and_then(|saved| todays_times(&saved, now));
                tracing::info!(
                    path = %config_path.display(),
                    with_times = times.is_some(),
                    "Migrating legacy two-file state"
                );
                return Some(from_json_config(&config, times.as_ref(), defaults, now));
            }
            _ => {
                tracing::warn!(
                    path = %config_path.display(),
                    "Legacy config is unreadable; skipping it"
                );
            }
        }
    }

    let line_path = storage.legacy_line_config_file();
    if line_path.exists() {
        match fs::read_to_string(&line_path) {
            Ok(content) => {
                tracing::info!(path = %line_path.display(), "Migrating legacy line config");
                return Some(from_line_config(&content, defaults, now));
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read legacy line config");
            }
        }
    }

    None
}

fn read_json(path: &std::path::Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to parse legacy file");
            None
        }
    }
}

/// Extracts `{key: seconds}` from a times file, but only if it was written today.
fn todays_times(saved: &Value, now: DateTime<FixedOffset>) -> Option<Map<String, Value>> {
    let today = now.date_naive().format("%Y-%m-%d").to_string();
    if saved.get("date").and_then(Value::as_str) != Some(today.as_str()) {
        tracing::debug!("Legacy times file is from another day; ignoring");
        return None;
    }
    saved.get("clients").and_then(Value::as_object).cloned()
}

fn from_json_config(
    config: &Map<String, Value>,
    times: Option<&Map<String, Value>>,
    defaults: &SettingsDefaults,
    now: DateTime<FixedOffset>,
) -> StateDocument {
    let mut doc = StateDocument::fresh(defaults, now);

    let rows = match config.get("clients") {
        Some(Value::Array(items)) => rows_from_legacy(items),
        _ => Vec::new(),
    };

    let collapsed = match config.get("collapsed_groups") {
        Some(Value::Array(items)) => collapsed_from_legacy(items, &rows),
        _ => Vec::new(),
    };

    for key in CARRIED_SETTINGS {
        if let Some(value) = config.get(*key) {
            doc.settings.set(*key, value.clone());
        }
    }
    if let Some(minutes) = config.get("backup_frequency").and_then(Value::as_u64) {
        doc.settings
            .set("snapshot_min_minutes", Value::from(minutes.max(1)));
    }

    doc.session.tracked_times = tracked_from_legacy(&rows, times);
    doc.layout.rows = rows;
    doc.layout.collapsed_groups = collapsed;
    doc
}

fn from_line_config(
    content: &str,
    defaults: &SettingsDefaults,
    now: DateTime<FixedOffset>,
) -> StateDocument {
    let mut doc = StateDocument::fresh(defaults, now);

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.starts_with("> clientList") {
            let names: Vec<Value> = value
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|name| Value::from(name.trim()))
                .collect();
            doc.layout.rows = rows_from_legacy(&names);
        } else if key.starts_with("> programColorTheme") {
            doc.settings.set("theme", Value::from(approximate_theme(value)));
        } else if key.starts_with("> programSize") {
            doc.settings.set("size", Value::from(value));
        }
    }

    doc.session.tracked_times = tracked_from_legacy(&doc.layout.rows, None);
    doc
}

fn approximate_theme(old: &str) -> &'static str {
    THEME_APPROXIMATIONS
        .iter()
        .find(|(from, _)| *from == old)
        .map(|(_, to)| *to)
        .unwrap_or("Cupertino Light")
}

/// Converts a legacy row list, assigning row ids by position.
fn rows_from_legacy(items: &[Value]) -> Vec<Row> {
    let mut rows = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::String(name) if !name.is_empty() => {
                let rowid = index as i64;
                let row = match name.strip_prefix(GROUP_MARKER) {
                    Some(group) => Row::new(rowid, group, RowKind::Separator),
                    None => Row::new(rowid, name.as_str(), RowKind::Timer),
                };
                rows.push(row);
            }
            Value::Object(_) => match serde_json::from_value::<Row>(item.clone()) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    tracing::warn!(index, error = %err, "Dropping malformed legacy row");
                }
            },
            _ => {}
        }
    }
    rows
}

/// Old collapsed groups were stored as `#name`; newer ones already as row ids.
fn collapsed_from_legacy(items: &[Value], rows: &[Row]) -> Vec<i64> {
    let mut collapsed = Vec::new();
    for item in items {
        if let Some(rowid) = item.as_i64() {
            collapsed.push(rowid);
            continue;
        }
        let Some(name) = item.as_str().and_then(|s| s.strip_prefix(GROUP_MARKER)) else {
            continue;
        };
        if let Some(row) = rows
            .iter()
            .find(|row| row.kind == RowKind::Separator && row.name == name)
        {
            collapsed.push(row.rowid);
        }
    }
    collapsed
}

/// Every timer row gets an entry; seconds are looked up by row id, then by name.
fn tracked_from_legacy(
    rows: &[Row],
    times: Option<&Map<String, Value>>,
) -> BTreeMap<String, TrackedTime> {
    rows.iter()
        .filter(|row| row.kind == RowKind::Timer)
        .map(|row| {
            let key = row.session_key();
            let seconds = times
                .and_then(|t| t.get(&key).or_else(|| t.get(&row.name)))
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite())
                .unwrap_or(0.0)
                .max(0.0);
            (key, TrackedTime::stopped(seconds))
        })
        .collect()
}
