//! Daily session rollover.
//!
//! A session runs from one daily reset boundary to the next. When the live
//! session's `start` is older than the most recent boundary, the session is
//! over: a completed copy is written to `completed_sessions/` (never pruned),
//! and the caller resets its timers and starts a new session at the boundary.
//!
//! The check needs only the recorded session start and the current time, so a
//! boundary that passed while the app was closed is honored on the next launch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, NaiveTime, TimeZone};
use fs_err as fs;

use crate::error::Result;
use crate::snapshot::store::TIMESTAMP_FORMAT;
use crate::state::{now_local, write_json_atomic, StateDocument};

const SESSION_PREFIX: &str = "session_";

/// The latest occurrence of the wall-clock time `at` that is not after `now`.
///
/// Today's boundary if `now` is at or past it, otherwise yesterday's. A
/// boundary that falls in a DST gap moves forward an hour; an ambiguous one
/// resolves to the earlier instant.
pub fn most_recent_boundary<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let boundary_today = resolve_local(&tz, today.and_time(at))?;
    if *now >= boundary_today {
        return Some(boundary_today);
    }
    let yesterday = today.pred_opt()?;
    resolve_local(&tz, yesterday.and_time(at))
}

/// The boundary a session started at `session_start` has crossed, if any.
pub fn due_boundary<Tz: TimeZone>(
    session_start: DateTime<FixedOffset>,
    now: &DateTime<Tz>,
    at: NaiveTime,
) -> Option<DateTime<FixedOffset>> {
    let boundary = most_recent_boundary(now, at)?.fixed_offset();
    (session_start < boundary).then_some(boundary)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// Writes completed sessions into one directory.
#[derive(Debug, Clone)]
pub struct SessionFinalizer {
    dir: PathBuf,
}

impl SessionFinalizer {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checks the boundary against the local clock.
    pub fn due(&self, session_start: DateTime<FixedOffset>, at: NaiveTime) -> Option<DateTime<FixedOffset>> {
        due_boundary(session_start, &Local::now(), at)
    }

    /// Persists a completed copy of `document` ending at `boundary`.
    ///
    /// `document` itself is not modified.
    pub fn finalize(
        &self,
        document: &StateDocument,
        boundary: DateTime<FixedOffset>,
    ) -> Result<PathBuf> {
        let mut completed = document.clone();
        completed.meta.is_completed_session = true;
        completed.meta.saved_at = now_local();
        completed.session.end = Some(boundary);

        let stamp = Local::now().naive_local().format(TIMESTAMP_FORMAT);
        let path = self.dir.join(format!("{}{}.json", SESSION_PREFIX, stamp));
        write_json_atomic(&path, &completed)?;
        tracing::info!(
            path = %path.display(),
            start = %completed.session.start,
            end = %boundary,
            "Saved completed session"
        );
        Ok(path)
    }

    /// Completed-session files, oldest first.
    pub fn list(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(SESSION_PREFIX) && name.ends_with(".json"))
            })
            .collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Row, RowKind, SettingsDefaults, TrackedTime};
    use tempfile::tempdir;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn ts(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    #[test]
    fn test_boundary_is_today_when_past_reset_time() {
        let now = ts("2024-03-10T09:15:00+02:00");
        let boundary = most_recent_boundary(&now, at(6, 0)).unwrap();
        assert_eq!(boundary, ts("2024-03-10T06:00:00+02:00"));
    }

    #[test]
    fn test_boundary_is_yesterday_before_reset_time() {
        let now = ts("2024-03-10T05:59:59+02:00");
        let boundary = most_recent_boundary(&now, at(6, 0)).unwrap();
        assert_eq!(boundary, ts("2024-03-09T06:00:00+02:00"));
    }

    #[test]
    fn test_boundary_at_exact_reset_time_is_today() {
        let now = ts("2024-03-10T00:00:00+00:00");
        let boundary = most_recent_boundary(&now, at(0, 0)).unwrap();
        assert_eq!(boundary, now);
    }

    #[test]
    fn test_due_only_when_start_before_boundary() {
        let now = ts("2024-03-10T09:00:00+00:00");
        let reset = at(6, 0);

        let stale = ts("2024-03-10T05:00:00+00:00");
        assert_eq!(
            due_boundary(stale, &now, reset),
            Some(ts("2024-03-10T06:00:00+00:00"))
        );

        // A session that starts exactly at the boundary has not crossed it.
        let fresh = ts("2024-03-10T06:00:00+00:00");
        assert_eq!(due_boundary(fresh, &now, reset), None);
    }

    #[test]
    fn test_missed_days_roll_over_to_latest_boundary() {
        let start = ts("2024-03-01T08:00:00+00:00");
        let now = ts("2024-03-10T09:00:00+00:00");
        assert_eq!(
            due_boundary(start, &now, at(0, 0)),
            Some(ts("2024-03-10T00:00:00+00:00"))
        );
    }

    #[test]
    fn test_finalize_writes_completed_copy() {
        let temp = tempdir().unwrap();
        let finalizer = SessionFinalizer::new(temp.path().join("completed_sessions"));

        let start = ts("2024-03-09T08:00:00+00:00");
        let mut doc = StateDocument::fresh(&SettingsDefaults::default(), start);
        doc.layout.rows.push(Row::new(0, "ACME", RowKind::Timer));
        doc.session
            .tracked_times
            .insert("0".to_string(), TrackedTime::stopped(42.0));
        let before = doc.clone();

        let boundary = ts("2024-03-10T00:00:00+00:00");
        let path = finalizer.finalize(&doc, boundary).unwrap();

        assert_eq!(doc, before);
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("session_"));

        let written: StateDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.meta.is_completed_session);
        assert_eq!(written.session.end, Some(boundary));
        assert_eq!(written.session.start, start);
        assert_eq!(written.session.tracked_times["0"].elapsed, 42.0);
        assert_eq!(finalizer.list(), vec![path]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = tempdir().unwrap();
        let finalizer = SessionFinalizer::new(temp.path().join("nope"));
        assert!(finalizer.list().is_empty());
    }
}
