//! Section-by-section repair of a loosely typed state document.
//!
//! Each top-level section (and each field inside it) is checked on its own. A
//! broken section is replaced with its default while valid siblings survive, and
//! every replaced field is reported by its dotted path (`settings.theme`,
//! `layout.rows[3]`, ...).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use super::types::{
    parse_timestamp, Layout, Meta, Row, Session, Settings, SettingsDefaults, SnapshotPriority,
    StateDocument, TrackedTime, SCHEMA_VERSION,
};

/// A repaired document plus the dotted paths of everything that was defaulted.
#[derive(Debug, Clone)]
pub struct Repaired {
    pub document: StateDocument,
    pub defaulted: Vec<String>,
}

impl Repaired {
    pub fn is_clean(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Repairs a parsed JSON value into a [`StateDocument`].
///
/// Returns `None` when the top level is not an object; there is nothing to
/// salvage in that case.
pub fn repair(
    value: Value,
    defaults: &SettingsDefaults,
    now: DateTime<FixedOffset>,
) -> Option<Repaired> {
    let Value::Object(mut root) = value else {
        return None;
    };

    let mut defaulted = Vec::new();
    let meta = repair_meta(root.remove("meta"), now, &mut defaulted);
    let layout = repair_layout(root.remove("layout"), &mut defaulted);
    let settings = repair_settings(root.remove("settings"), defaults, &mut defaulted);
    let session = repair_session(root.remove("session"), now, &mut defaulted);

    defaulted.sort();
    Some(Repaired {
        document: StateDocument {
            meta,
            layout,
            settings,
            session,
        },
        defaulted,
    })
}

fn repair_meta(
    value: Option<Value>,
    now: DateTime<FixedOffset>,
    defaulted: &mut Vec<String>,
) -> Meta {
    let Some(Value::Object(map)) = value else {
        defaulted.push("meta".to_string());
        return Meta::fresh(now);
    };

    let schema_version = match map.get("schema_version").and_then(Value::as_i64) {
        Some(version) => version,
        None => {
            defaulted.push("meta.schema_version".to_string());
            SCHEMA_VERSION
        }
    };
    if schema_version > SCHEMA_VERSION {
        tracing::warn!(
            schema_version,
            supported = SCHEMA_VERSION,
            "State document is newer than this build; loading best-effort"
        );
    }

    let is_completed_session = match map.get("is_completed_session").and_then(Value::as_bool) {
        Some(flag) => flag,
        None => {
            defaulted.push("meta.is_completed_session".to_string());
            false
        }
    };

    let saved_at = match timestamp_field(&map, "saved_at") {
        Some(ts) => ts,
        None => {
            defaulted.push("meta.saved_at".to_string());
            now
        }
    };

    let snapshot_reason = map
        .get("snapshot_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let snapshot_priority = map
        .get("snapshot_priority")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<SnapshotPriority>().ok());

    Meta {
        schema_version,
        saved_at,
        is_completed_session,
        snapshot_reason,
        snapshot_priority,
    }
}

fn repair_layout(value: Option<Value>, defaulted: &mut Vec<String>) -> Layout {
    let Some(Value::Object(mut map)) = value else {
        defaulted.push("layout".to_string());
        return Layout::default();
    };

    let mut rows = Vec::new();
    match map.remove("rows") {
        Some(Value::Array(items)) => {
            let mut seen = HashSet::new();
            for (index, item) in items.into_iter().enumerate() {
                match serde_json::from_value::<Row>(item) {
                    Ok(row) if seen.insert(row.rowid) => rows.push(row),
                    _ => defaulted.push(format!("layout.rows[{}]", index)),
                }
            }
        }
        _ => defaulted.push("layout.rows".to_string()),
    }

    let mut collapsed_groups = Vec::new();
    match map.remove("collapsed_groups") {
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                match item.as_i64() {
                    Some(rowid) => collapsed_groups.push(rowid),
                    None => defaulted.push(format!("layout.collapsed_groups[{}]", index)),
                }
            }
        }
        _ => defaulted.push("layout.collapsed_groups".to_string()),
    }

    Layout {
        rows,
        collapsed_groups,
    }
}

fn repair_settings(
    value: Option<Value>,
    defaults: &SettingsDefaults,
    defaulted: &mut Vec<String>,
) -> Settings {
    let Some(Value::Object(map)) = value else {
        defaulted.push("settings".to_string());
        return defaults.to_settings();
    };

    let mut settings = Settings::from_map(map);
    for key in settings.fill_defaults(defaults) {
        defaulted.push(format!("settings.{}", key));
    }
    settings
}

fn repair_session(
    value: Option<Value>,
    now: DateTime<FixedOffset>,
    defaulted: &mut Vec<String>,
) -> Session {
    let Some(Value::Object(map)) = value else {
        defaulted.push("session".to_string());
        return Session::starting_at(now);
    };

    let start = match timestamp_field(&map, "start") {
        Some(ts) => ts,
        None => {
            defaulted.push("session.start".to_string());
            now
        }
    };

    let end = match map.get("end") {
        None | Some(Value::Null) => None,
        Some(_) => {
            let parsed = timestamp_field(&map, "end");
            if parsed.is_none() {
                defaulted.push("session.end".to_string());
            }
            parsed
        }
    };

    let mut tracked_times = BTreeMap::new();
    match map.get("tracked_times") {
        Some(Value::Object(entries)) => {
            for (key, entry) in entries {
                if let Some(tracked) = repair_tracked_time(key, entry, defaulted) {
                    tracked_times.insert(key.clone(), tracked);
                }
            }
        }
        _ => defaulted.push("session.tracked_times".to_string()),
    }

    Session {
        start,
        end,
        tracked_times,
    }
}

fn repair_tracked_time(key: &str, entry: &Value, defaulted: &mut Vec<String>) -> Option<TrackedTime> {
    let path = format!("session.tracked_times.{}", key);
    let Some(elapsed) = entry.get("elapsed").and_then(Value::as_f64) else {
        defaulted.push(path);
        return None;
    };

    let elapsed = if elapsed.is_finite() && elapsed >= 0.0 {
        elapsed
    } else {
        defaulted.push(format!("{}.elapsed", path));
        0.0
    };

    let running_since = match entry.get("running_since") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let parsed = raw.as_str().and_then(parse_timestamp);
            if parsed.is_none() {
                defaulted.push(format!("{}.running_since", path));
            }
            parsed
        }
    };

    Some(TrackedTime {
        elapsed,
        running_since,
    })
}

fn timestamp_field(map: &Map<String, Value>, key: &str) -> Option<DateTime<FixedOffset>> {
    map.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}
