//! Timestamped snapshots and time-tiered retention.
//!
//! Snapshots are write-once copies of the state document named
//! `state_<YYYYMMDD>_<HHMMSS>_<micros>.json` (local time), so names sort in
//! creation order.
//!
//! # Retention
//!
//! For each tier age `t`, the snapshot closest to `now - t` is kept. The newest
//! snapshot is always kept. Everything else is deleted. The kept set depends
//! only on the snapshot timestamps and `now`, so pruning twice in a row deletes
//! nothing the second time.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use fs_err as fs;

use crate::error::Result;
use crate::state::{write_json_atomic, SnapshotPriority, StateDocument};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const SNAPSHOT_PREFIX: &str = "state_";
const SNAPSHOT_EXT: &str = ".json";

/// Default tier ages: 5 min, 10 min, 20 min, 1 h, 6 h, 1 day, 2 days, 4 days.
pub const DEFAULT_TIERS: [Duration; 8] = [
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(20 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(6 * 3600),
    Duration::from_secs(24 * 3600),
    Duration::from_secs(2 * 86400),
    Duration::from_secs(4 * 86400),
];

/// A snapshot file whose name parsed to a creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub file_name: String,
    pub created: NaiveDateTime,
}

/// Result of one prune pass.
#[derive(Debug, Default, Clone)]
pub struct PruneStats {
    pub kept: usize,
    pub deleted: usize,
    /// Deletion failures. Never fatal.
    pub errors: Vec<String>,
}

/// Writes snapshots into one directory and prunes it.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    tiers: Vec<Duration>,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf, tiers: Vec<Duration>) -> Self {
        Self { dir, tiers }
    }

    pub fn with_default_tiers(dir: PathBuf) -> Self {
        Self::new(dir, DEFAULT_TIERS.to_vec())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tiers(&self) -> &[Duration] {
        &self.tiers
    }

    /// Writes a copy of `document` annotated with `reason` and `priority`.
    ///
    /// The caller's document is not touched.
    pub fn create(
        &self,
        document: &StateDocument,
        reason: &str,
        priority: SnapshotPriority,
    ) -> Result<PathBuf> {
        let mut snapshot = document.clone();
        snapshot.meta.snapshot_reason = Some(reason.to_string());
        snapshot.meta.snapshot_priority = Some(priority);

        let stamp = Local::now().naive_local().format(TIMESTAMP_FORMAT);
        let path = self
            .dir
            .join(format!("{}{}{}", SNAPSHOT_PREFIX, stamp, SNAPSHOT_EXT));
        write_json_atomic(&path, &snapshot)?;
        tracing::debug!(
            reason,
            priority = %priority,
            path = %path.display(),
            "Saved snapshot"
        );
        Ok(path)
    }

    /// Parseable snapshots in the directory, newest first. Missing directory means none.
    pub fn list(&self) -> Vec<SnapshotEntry> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut entries: Vec<SnapshotEntry> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_str()?.to_string();
                let created = parse_snapshot_time(&file_name)?;
                Some(SnapshotEntry { file_name, created })
            })
            .collect();
        sort_newest_first(&mut entries);
        entries
    }

    /// Applies tiered retention relative to the current local time.
    pub fn prune(&self) -> PruneStats {
        self.prune_at(Local::now().naive_local())
    }

    pub fn prune_at(&self, now: NaiveDateTime) -> PruneStats {
        let entries = self.list();
        let mut stats = PruneStats::default();
        if entries.len() <= 1 {
            stats.kept = entries.len();
            return stats;
        }

        let keep = plan_retention(&entries, now, &self.tiers);
        stats.kept = keep.len();
        for entry in &entries {
            if keep.contains(&entry.file_name) {
                continue;
            }
            match fs::remove_file(self.dir.join(&entry.file_name)) {
                Ok(()) => stats.deleted += 1,
                Err(err) => stats.errors.push(err.to_string()),
            }
        }

        if stats.deleted > 0 {
            tracing::info!(
                deleted = stats.deleted,
                kept = stats.kept,
                dir = %self.dir.display(),
                "Pruned snapshots"
            );
        }
        for error in &stats.errors {
            tracing::debug!(error = %error, "Snapshot deletion failed; continuing");
        }
        stats
    }
}

/// Chooses which snapshots survive: the newest one plus, for each tier, the
/// snapshot closest to `now - tier`.
///
/// Ties go to the newer snapshot (then the lexicographically smaller name), so
/// the result is deterministic for a given input set.
pub fn plan_retention(
    entries: &[SnapshotEntry],
    now: NaiveDateTime,
    tiers: &[Duration],
) -> BTreeSet<String> {
    let mut ordered: Vec<&SnapshotEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    let mut keep = BTreeSet::new();
    let Some(newest) = ordered.first() else {
        return keep;
    };
    keep.insert(newest.file_name.clone());

    for tier in tiers {
        let Ok(offset) = chrono::Duration::from_std(*tier) else {
            continue;
        };
        let Some(target) = now.checked_sub_signed(offset) else {
            continue;
        };
        let mut best: Option<(&SnapshotEntry, i64)> = None;
        for entry in &ordered {
            let distance = distance_micros(entry.created, target);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((entry, distance)),
            }
        }
        if let Some((entry, _)) = best {
            keep.insert(entry.file_name.clone());
        }
    }
    keep
}

fn distance_micros(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_microseconds().map_or(i64::MAX, i64::abs)
}

fn sort_newest_first(entries: &mut [SnapshotEntry]) {
    entries.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

/// Extracts the creation time from `state_20260212_140311_123456.json`.
pub fn parse_snapshot_time(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_EXT)?;
    parse_stamp(stem)
}

/// Parses `YYYYMMDD_HHMMSS_ffffff`.
pub(crate) fn parse_stamp(stem: &str) -> Option<NaiveDateTime> {
    let mut parts = stem.split('_');
    let (date, time, micros) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some()
        || date.len() != 8
        || time.len() != 6
        || micros.len() != 6
        || !micros.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
    let micros: u32 = micros.parse().ok()?;
    date.and_time(time).with_nanosecond(micros * 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SettingsDefaults;
    use chrono::{Duration as ChronoDuration, Timelike};
    use std::thread;
    use tempfile::tempdir;

    fn sample_doc() -> StateDocument {
        let now = crate::state::now_local();
        let mut doc = StateDocument::fresh(&SettingsDefaults::default(), now);
        doc.layout
            .rows
            .push(crate::state::Row::new(0, "A", crate::state::RowKind::Timer));
        doc
    }

    fn touch_snapshot(dir: &Path, created: NaiveDateTime) -> String {
        let name = format!("state_{}.json", created.format(TIMESTAMP_FORMAT));
        std::fs::write(dir.join(&name), r#"{"meta": {}}"#).unwrap();
        name
    }

    fn count_snapshots(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("state_"))
            .count()
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 12)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_create_snapshot_content() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        let path = store
            .create(&sample_doc(), "layout_change", SnapshotPriority::High)
            .unwrap();
        let snap: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snap["meta"]["snapshot_reason"], "layout_change");
        assert_eq!(snap["meta"]["snapshot_priority"], "high");
        assert_eq!(snap["layout"]["rows"][0]["name"], "A");
    }

    #[test]
    fn test_create_snapshot_does_not_mutate_original() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        let doc = sample_doc();
        let before = doc.clone();
        store.create(&doc, "test", SnapshotPriority::Low).unwrap();
        assert_eq!(doc, before);
        assert!(doc.meta.snapshot_reason.is_none());
    }

    #[test]
    fn test_snapshot_filename_format() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().join("snaps"));
        let path = store.create(&sample_doc(), "test", SnapshotPriority::Low).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("state_"));
        assert!(name.ends_with(".json"));
        assert!(parse_snapshot_time(name).is_some());
    }

    #[test]
    fn test_parse_snapshot_time() {
        let dt = parse_snapshot_time("state_20260212_143011_123456.json").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2026, 2, 12).unwrap());
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (14, 30, 11));
        assert_eq!(dt.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_snapshot_time_bad_name() {
        assert!(parse_snapshot_time("garbage.json").is_none());
        assert!(parse_snapshot_time("state_notadate.json").is_none());
        assert!(parse_snapshot_time("state_20261399_000000_000000.json").is_none());
        assert!(parse_snapshot_time("session_20260212_143011_123456.json").is_none());
    }

    #[test]
    fn test_prune_empty_and_missing_dir_safe() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        assert_eq!(store.prune().deleted, 0);
        let missing = SnapshotStore::with_default_tiers(temp.path().join("nope"));
        assert_eq!(missing.prune().deleted, 0);
    }

    #[test]
    fn test_prune_single_snapshot_safe() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        touch_snapshot(temp.path(), fixed_now() - ChronoDuration::days(30));
        let stats = store.prune_at(fixed_now());
        assert_eq!(stats.deleted, 0);
        assert_eq!(count_snapshots(temp.path()), 1);
    }

    #[test]
    fn test_prune_keeps_newest_and_bounds_count() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        for _ in 0..20 {
            store.create(&sample_doc(), "test", SnapshotPriority::Low).unwrap();
            thread::sleep(std::time::Duration::from_millis(2));
        }
        let newest = store.list()[0].file_name.clone();

        store.prune();

        let remaining = store.list();
        assert!(!remaining.is_empty());
        assert!(remaining.len() <= DEFAULT_TIERS.len() + 1);
        assert_eq!(remaining[0].file_name, newest);
    }

    #[test]
    fn test_prune_ignores_non_snapshot_files() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        let other = temp.path().join("notes.txt");
        std::fs::write(&other, "hello").unwrap();
        let odd = temp.path().join("state_notadate.json");
        std::fs::write(&odd, "{}").unwrap();
        for minutes in 0..15 {
            touch_snapshot(temp.path(), fixed_now() - ChronoDuration::minutes(minutes));
        }

        store.prune_at(fixed_now());
        assert!(other.exists());
        assert!(odd.exists());
    }

    #[test]
    fn test_snapshot_tiered_retention_over_five_days() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        let offsets_minutes = [
            0, 1, 2, 3, 4, 5, 8, 10, 15, 20, 30, 60, 120, 360, 720, 1440, 2880, 4320, 5760,
        ];
        let mut names = Vec::new();
        for offset in offsets_minutes {
            names.push(touch_snapshot(
                temp.path(),
                fixed_now() - ChronoDuration::minutes(offset),
            ));
        }

        store.prune_at(fixed_now());

        let remaining: BTreeSet<String> =
            store.list().into_iter().map(|e| e.file_name).collect();
        assert!(remaining.len() <= DEFAULT_TIERS.len() + 1);
        // newest, then exact tier hits at 5, 10, 20, 60, 360, 1440, 2880 minutes;
        // the 4-day tier (5760 min) also matches exactly.
        let expected: BTreeSet<String> = [0usize, 5, 7, 9, 11, 13, 15, 16, 18]
            .iter()
            .map(|i| names[*i].clone())
            .collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::with_default_tiers(temp.path().to_path_buf());
        for minutes in (0..600).step_by(7) {
            touch_snapshot(temp.path(), fixed_now() - ChronoDuration::minutes(minutes));
        }
        let first = store.prune_at(fixed_now());
        assert!(first.deleted > 0);
        let second = store.prune_at(fixed_now());
        assert_eq!(second.deleted, 0);
        assert_eq!(second.kept, first.kept);
    }

    #[test]
    fn test_plan_retention_prefers_newer_on_tie() {
        let now = fixed_now();
        let entries = vec![
            SnapshotEntry {
                file_name: "state_a.json".into(),
                created: now - ChronoDuration::minutes(4),
            },
            SnapshotEntry {
                file_name: "state_b.json".into(),
                created: now - ChronoDuration::minutes(6),
            },
            SnapshotEntry {
                file_name: "state_c.json".into(),
                created: now - ChronoDuration::minutes(30),
            },
        ];
        let keep = plan_retention(&entries, now, &[std::time::Duration::from_secs(300)]);
        // 4 and 6 minutes are equally far from the 5-minute target.
        assert_eq!(
            keep,
            ["state_a.json".to_string()].into_iter().collect::<BTreeSet<_>>()
        );
    }
    #[test]
    fn test_plan_retention_skips_unrepresentable_tier() {
        let now = fixed_now();
        let entries = vec![
            SnapshotEntry {
                file_name: "state_new.json".into(),
                created: now - ChronoDuration::minutes(1),
            },
            SnapshotEntry {
                file_name: "state_old.json".into(),
                created: now - ChronoDuration::minutes(10),
            },
        ];
        // About 31 million years: fits a chrono duration but not a date.
        let tiers = [
            std::time::Duration::from_secs(1_000_000_000_000_000),
            std::time::Duration::from_secs(600),
        ];
        let keep = plan_retention(&entries, now, &tiers);
        assert_eq!(keep.len(), 2);
    }
}
