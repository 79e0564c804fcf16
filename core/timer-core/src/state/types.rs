//! Serialized state document types.
//!
//! Current on-disk format is schema version 1:
//!
//! ```json
//! {
//!   "meta": { "schema_version": 1, "saved_at": "...", "is_completed_session": false },
//!   "layout": { "rows": [{ "rowid": 0, "name": "ACME", "type": "timer", "bg": null }],
//!               "collapsed_groups": [] },
//!   "settings": { "theme": "Cupertino Light", ... },
//!   "session": { "start": "...", "tracked_times": { "0": { "elapsed": 12.5 } } }
//! }
//! ```
//!
//! Every type here is plain owned data, so `clone()` is a full deep copy that
//! shares nothing with the original.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Highest schema version this build writes and fully understands.
pub const SCHEMA_VERSION: i64 = 1;

const DEFAULT_THEME: &str = "Cupertino Light";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub meta: Meta,
    pub layout: Layout,
    pub settings: Settings,
    pub session: Session,
}

impl StateDocument {
    /// A brand-new document: empty layout, default settings, session starting at `now`.
    pub fn fresh(defaults: &SettingsDefaults, now: DateTime<FixedOffset>) -> Self {
        Self {
            meta: Meta::fresh(now),
            layout: Layout::default(),
            settings: defaults.to_settings(),
            session: Session::starting_at(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: i64,
    pub saved_at: DateTime<FixedOffset>,
    pub is_completed_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_priority: Option<SnapshotPriority>,
}

impl Meta {
    pub fn fresh(now: DateTime<FixedOffset>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: now,
            is_completed_session: false,
            snapshot_reason: None,
            snapshot_priority: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub collapsed_groups: Vec<i64>,
}

impl Layout {
    pub fn timer_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|row| row.kind == RowKind::Timer)
    }

    pub fn row(&self, rowid: i64) -> Option<&Row> {
        self.rows.iter().find(|row| row.rowid == rowid)
    }

    /// Next unused row id.
    pub fn next_rowid(&self) -> i64 {
        self.rows.iter().map(|row| row.rowid).max().map_or(0, |max| max + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Timer,
    Separator,
}

/// One layout entry. Fields the engine does not know about are carried in `extra`
/// and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub rowid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RowKind,
    #[serde(default)]
    pub bg: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Row {
    pub fn new(rowid: i64, name: impl Into<String>, kind: RowKind) -> Self {
        Self {
            rowid,
            name: name.into(),
            kind,
            bg: None,
            extra: Map::new(),
        }
    }

    /// Key of this row in `session.tracked_times`.
    pub fn session_key(&self) -> String {
        self.rowid.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Flat option map. The engine only reads the few keys it acts on; everything
/// else is the host's business and is passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Back-fills missing keys from `defaults`, returning the keys that were filled.
    pub fn fill_defaults(&mut self, defaults: &SettingsDefaults) -> Vec<String> {
        let mut filled = Vec::new();
        for (key, value) in defaults.iter() {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
                filled.push(key.clone());
            }
        }
        filled
    }

    pub fn theme(&self) -> &str {
        self.get("theme")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_THEME)
    }

    pub fn daily_reset_enabled(&self) -> bool {
        self.get("daily_reset_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Daily boundary as `HH:MM`; unparseable values mean midnight.
    pub fn daily_reset_time(&self) -> NaiveTime {
        self.get("daily_reset_time")
            .and_then(Value::as_str)
            .and_then(|raw| NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok())
            .unwrap_or(NaiveTime::MIN)
    }

    /// Minimum minutes between non-urgent snapshots (at least 1).
    pub fn snapshot_min_minutes(&self) -> u64 {
        self.get("snapshot_min_minutes")
            .and_then(|value| {
                value
                    .as_u64()
                    .or_else(|| value.as_f64().filter(|m| *m >= 0.0).map(|m| m.round() as u64))
            })
            .unwrap_or(5)
            .max(1)
    }
}

/// The defaults table used to fill missing settings keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsDefaults(Map<String, Value>);

impl Default for SettingsDefaults {
    fn default() -> Self {
        let mut map = Map::new();
        map.insert("theme".into(), Value::from(DEFAULT_THEME));
        map.insert("size".into(), Value::from("Regular"));
        map.insert("font".into(), Value::from("Calibri"));
        map.insert("label_align".into(), Value::from("Left"));
        map.insert("client_separators".into(), Value::from(true));
        map.insert("show_group_count".into(), Value::from(true));
        map.insert("show_group_time".into(), Value::from(true));
        map.insert("always_on_top".into(), Value::from(true));
        map.insert("confirm_delete".into(), Value::from(true));
        map.insert("confirm_reset".into(), Value::from(true));
        map.insert("daily_reset_enabled".into(), Value::from(false));
        map.insert("daily_reset_time".into(), Value::from("00:00"));
        map.insert("snapshot_min_minutes".into(), Value::from(5));
        Self(map)
    }
}

impl SettingsDefaults {
    /// Overrides (or adds) one default.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_settings(&self) -> Settings {
        Settings(self.0.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub start: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub tracked_times: BTreeMap<String, TrackedTime>,
}

impl Session {
    pub fn starting_at(start: DateTime<FixedOffset>) -> Self {
        Self {
            start,
            end: None,
            tracked_times: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedTime {
    pub elapsed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_since: Option<DateTime<FixedOffset>>,
}

impl TrackedTime {
    pub fn stopped(elapsed: f64) -> Self {
        Self {
            elapsed,
            running_since: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot priority
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPriority {
    Low,
    Medium,
    High,
}

impl SnapshotPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotPriority::Low => "low",
            SnapshotPriority::Medium => "medium",
            SnapshotPriority::High => "high",
        }
    }
}

impl fmt::Display for SnapshotPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotPriority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SnapshotPriority::Low),
            "medium" | "normal" => Ok(SnapshotPriority::Medium),
            "high" => Ok(SnapshotPriority::High),
            other => Err(format!("unknown snapshot priority: {}", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Current local wall-clock time with its UTC offset.
pub fn now_local() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Parses an ISO-8601 timestamp. Offset-less values are read as local time.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_round_trips_unknown_fields() {
        let raw = json!({"rowid": 4, "name": "Ops", "type": "separator", "bg": "#ff0000", "icon": "star"});
        let row: Row = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(row.kind, RowKind::Separator);
        assert_eq!(row.extra.get("icon"), Some(&json!("star")));
        assert_eq!(serde_json::to_value(&row).unwrap(), raw);
    }

    #[test]
    fn test_row_without_bg_serializes_null() {
        let row = Row::new(0, "ACME", RowKind::Timer);
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["bg"], Value::Null);
        assert_eq!(value["type"], json!("timer"));
    }

    #[test]
    fn test_fill_defaults_reports_missing_keys_only() {
        let mut map = Map::new();
        map.insert("theme".into(), json!("X"));
        let mut settings = Settings::from_map(map);
        let filled = settings.fill_defaults(&SettingsDefaults::default());
        assert!(!filled.contains(&"theme".to_string()));
        assert!(filled.contains(&"snapshot_min_minutes".to_string()));
        assert_eq!(settings.theme(), "X");
        assert_eq!(settings.snapshot_min_minutes(), 5);
    }

    #[test]
    fn test_daily_reset_time_parsing() {
        let mut settings = SettingsDefaults::default().to_settings();
        settings.set("daily_reset_time", json!("06:30"));
        assert_eq!(
            settings.daily_reset_time(),
            NaiveTime::from_hms_opt(6, 30, 0).unwrap()
        );
        settings.set("daily_reset_time", json!("bogus"));
        assert_eq!(settings.daily_reset_time(), NaiveTime::MIN);
    }

    #[test]
    fn test_snapshot_min_minutes_is_at_least_one() {
        let mut settings = SettingsDefaults::default().to_settings();
        settings.set("snapshot_min_minutes", json!(0));
        assert_eq!(settings.snapshot_min_minutes(), 1);
        settings.set("snapshot_min_minutes", json!(12.0));
        assert_eq!(settings.snapshot_min_minutes(), 12);
    }

    #[test]
    fn test_priority_parse_and_display() {
        assert_eq!("HIGH".parse::<SnapshotPriority>(), Ok(SnapshotPriority::High));
        assert_eq!("normal".parse::<SnapshotPriority>(), Ok(SnapshotPriority::Medium));
        assert!("urgent".parse::<SnapshotPriority>().is_err());
        assert_eq!(SnapshotPriority::Low.to_string(), "low");
    }

    #[test]
    fn test_parse_timestamp_accepts_offset_and_naive() {
        let aware = parse_timestamp("2026-02-12T14:03:11.123456-05:00").unwrap();
        assert_eq!(aware.offset().local_minus_utc(), -5 * 3600);
        assert!(parse_timestamp("2026-02-12T14:03:11").is_some());
        assert!(parse_timestamp("x").is_none());
    }

    #[test]
    fn test_next_rowid() {
        let mut layout = Layout::default();
        assert_eq!(layout.next_rowid(), 0);
        layout.rows.push(Row::new(7, "A", RowKind::Timer));
        layout.rows.push(Row::new(2, "B", RowKind::Separator));
        assert_eq!(layout.next_rowid(), 8);
        assert_eq!(layout.timer_rows().count(), 1);
    }
}
