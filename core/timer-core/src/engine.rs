//! Tick-driven orchestration of timers and persistence.
//!
//! [`TimerEngine`] owns the live layout, settings and per-row timers. The host
//! calls [`TimerEngine::tick`] about once a second; each tick:
//!
//! 1. rolls the session over if daily reset is on and a boundary has passed,
//! 2. saves the live document every `autosave_every_ticks` ticks,
//! 3. asks the scheduler whether a snapshot is due and takes it.
//!
//! Everything runs on the caller's thread. Disk failures never abort a tick;
//! they are collected into the [`TickReport`] for the host to show.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::config::CoreConfig;
use crate::error::{Result, TimerError};
use crate::session::SessionFinalizer;
use crate::snapshot::{RequestDecision, SnapshotScheduler, SnapshotStore};
use crate::state::{
    now_local, Layout, LoadOutcome, LoadSource, Meta, Row, RowKind, Session, Settings,
    SnapshotPriority, StateDocument, StateStore, TrackedTime,
};
use crate::timer::ElapsedTimer;

pub const APP_EXIT_REASON: &str = "app_exit";
pub const DAILY_RESET_REASON: &str = "daily_reset_rollover";
pub const LAYOUT_CHANGE_REASON: &str = "layout_change";

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub snapshot: Option<PathBuf>,
    pub completed_session: Option<PathBuf>,
    pub autosaved: bool,
    /// User-facing messages for failed writes. The in-memory state is intact.
    pub errors: Vec<String>,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.snapshot.is_none()
            && self.completed_session.is_none()
            && !self.autosaved
            && self.errors.is_empty()
    }
}

pub struct TimerEngine {
    store: StateStore,
    snapshots: SnapshotStore,
    finalizer: SessionFinalizer,
    scheduler: SnapshotScheduler,
    layout: Layout,
    settings: Settings,
    session_start: DateTime<FixedOffset>,
    timers: BTreeMap<i64, ElapsedTimer>,
    load_source: LoadSource,
    defaulted: Vec<String>,
    ticks: u64,
    autosave_every_ticks: u32,
    startup: TickReport,
}

impl TimerEngine {
    /// Loads (or creates) the live document and restores one timer per timer row.
    ///
    /// If daily reset is on and a boundary passed while the app was closed, the
    /// rollover happens here; see [`startup_report`](Self::startup_report).
    pub fn open(config: CoreConfig) -> Self {
        let store = StateStore::new(config.storage.clone(), config.settings_defaults.clone());
        let LoadOutcome {
            document,
            source,
            defaulted,
        } = store.load();

        let timers: BTreeMap<i64, ElapsedTimer> = document
            .layout
            .timer_rows()
            .map(|row| {
                let timer = match document.session.tracked_times.get(&row.session_key()) {
                    Some(tracked) => {
                        ElapsedTimer::restore(row.rowid, tracked.elapsed, tracked.running_since)
                    }
                    None => ElapsedTimer::new(row.rowid),
                };
                (row.rowid, timer)
            })
            .collect();

        let scheduler = SnapshotScheduler::new(
            min_interval(&document.settings),
            config.debounce,
            Instant::now(),
        );

        let mut engine = Self {
            store,
            snapshots: SnapshotStore::new(
                config.storage.snapshots_dir(),
                config.retention_tiers.clone(),
            ),
            finalizer: SessionFinalizer::new(config.storage.completed_sessions_dir()),
            scheduler,
            layout: document.layout,
            settings: document.settings,
            session_start: document.session.start,
            timers,
            load_source: source,
            defaulted,
            ticks: 0,
            autosave_every_ticks: config.autosave_every_ticks,
            startup: TickReport::default(),
        };

        if engine.settings.daily_reset_enabled() {
            let mut report = TickReport::default();
            engine.roll_over_if_due(&mut report);
            engine.startup = report;
        }

        tracing::info!(
            source = ?engine.load_source,
            timers = engine.timers.len(),
            running = engine.timers.values().filter(|t| t.is_running()).count(),
            "Timer engine ready"
        );
        engine
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn load_source(&self) -> LoadSource {
        self.load_source
    }

    /// Fields that were defaulted when the document was loaded.
    pub fn defaulted(&self) -> &[String] {
        &self.defaulted
    }

    /// Result of the rollover check performed by [`open`](Self::open).
    pub fn startup_report(&self) -> &TickReport {
        &self.startup
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session_start(&self) -> DateTime<FixedOffset> {
        self.session_start
    }

    pub fn timers(&self) -> impl Iterator<Item = &ElapsedTimer> {
        self.timers.values()
    }

    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn finalizer(&self) -> &SessionFinalizer {
        &self.finalizer
    }

    pub fn scheduler(&self) -> &SnapshotScheduler {
        &self.scheduler
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timer operations
    // ─────────────────────────────────────────────────────────────────────

    pub fn start(&mut self, rowid: i64) -> Result<()> {
        self.timer_mut(rowid)?.start();
        Ok(())
    }

    /// Stops every other timer, then starts `rowid`.
    pub fn start_exclusive(&mut self, rowid: i64) -> Result<()> {
        self.timer_mut(rowid)?;
        self.stop_all();
        self.start(rowid)
    }

    pub fn stop(&mut self, rowid: i64) -> Result<()> {
        self.timer_mut(rowid)?.stop();
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for timer in self.timers.values_mut() {
            timer.stop();
        }
    }

    /// Adds `delta_seconds` (clamped at zero) and saves.
    pub fn adjust(&mut self, rowid: i64, delta_seconds: f64) -> Result<()> {
        self.timer_mut(rowid)?.adjust(delta_seconds);
        self.save()?;
        Ok(())
    }

    pub fn reset(&mut self, rowid: i64) -> Result<()> {
        self.timer_mut(rowid)?.reset();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for timer in self.timers.values_mut() {
            timer.reset();
        }
        tracing::info!(timers = self.timers.len(), "Reset all timers");
    }

    pub fn current_elapsed(&self, rowid: i64) -> Result<f64> {
        Ok(self.timer(rowid)?.current_elapsed())
    }

    pub fn is_running(&self, rowid: i64) -> Result<bool> {
        Ok(self.timer(rowid)?.is_running())
    }

    fn timer(&self, rowid: i64) -> Result<&ElapsedTimer> {
        self.check_timer_row(rowid)?;
        self.timers.get(&rowid).ok_or(TimerError::UnknownRow(rowid))
    }

    fn timer_mut(&mut self, rowid: i64) -> Result<&mut ElapsedTimer> {
        self.check_timer_row(rowid)?;
        self.timers
            .get_mut(&rowid)
            .ok_or(TimerError::UnknownRow(rowid))
    }

    fn check_timer_row(&self, rowid: i64) -> Result<()> {
        match self.layout.row(rowid) {
            None => Err(TimerError::UnknownRow(rowid)),
            Some(row) if row.kind != RowKind::Timer => Err(TimerError::NotATimer(rowid)),
            Some(_) => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Layout and settings
    // ─────────────────────────────────────────────────────────────────────

    /// Replaces the layout, saves, and marks a layout change for the scheduler.
    ///
    /// New timer rows get a zeroed timer; timers whose row is gone are dropped.
    pub fn set_layout(&mut self, layout: Layout) -> Result<()> {
        self.layout = layout;
        self.sync_timers();
        self.layout_changed()
    }

    /// Appends a row and returns its id.
    pub fn add_row(&mut self, name: &str, kind: RowKind) -> Result<i64> {
        let rowid = self.layout.next_rowid();
        self.layout.rows.push(Row::new(rowid, name, kind));
        self.sync_timers();
        self.layout_changed()?;
        Ok(rowid)
    }

    pub fn remove_row(&mut self, rowid: i64) -> Result<()> {
        if self.layout.row(rowid).is_none() {
            return Err(TimerError::UnknownRow(rowid));
        }
        self.layout.rows.retain(|row| row.rowid != rowid);
        self.layout.collapsed_groups.retain(|id| *id != rowid);
        self.sync_timers();
        self.layout_changed()
    }

    /// Updates one setting. Changing `snapshot_min_minutes` retunes the scheduler.
    pub fn set_setting(&mut self, key: &str, value: Value) {
        self.settings.set(key, value);
        if key == "snapshot_min_minutes" {
            self.scheduler.set_min_interval(min_interval(&self.settings));
            tracing::info!(
                minutes = self.settings.snapshot_min_minutes(),
                "Snapshot interval changed"
            );
        }
    }

    fn sync_timers(&mut self) {
        let ids: BTreeSet<i64> = self.layout.timer_rows().map(|row| row.rowid).collect();
        self.timers.retain(|id, _| ids.contains(id));
        for id in ids {
            self.timers.entry(id).or_insert_with(|| ElapsedTimer::new(id));
        }
    }

    fn layout_changed(&mut self) -> Result<()> {
        self.scheduler
            .request(LAYOUT_CHANGE_REASON, SnapshotPriority::Medium, Instant::now());
        self.save()?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// The current state as a document. Running timers are frozen first.
    pub fn document(&mut self) -> StateDocument {
        let tracked_times = self
            .timers
            .iter_mut()
            .map(|(id, timer)| {
                timer.freeze();
                let running_since = if timer.is_running() {
                    timer.started_at()
                } else {
                    None
                };
                (
                    id.to_string(),
                    TrackedTime {
                        elapsed: timer.elapsed(),
                        running_since,
                    },
                )
            })
            .collect();

        StateDocument {
            meta: Meta::fresh(now_local()),
            layout: self.layout.clone(),
            settings: self.settings.clone(),
            session: Session {
                start: self.session_start,
                end: None,
                tracked_times,
            },
        }
    }

    /// Writes the live document.
    pub fn save(&mut self) -> Result<StateDocument> {
        let mut document = self.document();
        self.store.save(&mut document)?;
        Ok(document)
    }

    /// Routes a snapshot request through the scheduler.
    ///
    /// High priority snapshots immediately and returns the path; anything else
    /// is deferred to a later tick and returns `None`.
    pub fn request_snapshot(
        &mut self,
        reason: &str,
        priority: SnapshotPriority,
    ) -> Result<Option<PathBuf>> {
        self.request_snapshot_at(reason, priority, Instant::now())
    }

    pub fn request_snapshot_at(
        &mut self,
        reason: &str,
        priority: SnapshotPriority,
        now: Instant,
    ) -> Result<Option<PathBuf>> {
        match self.scheduler.request(reason, priority, now) {
            RequestDecision::FireNow => self.take_snapshot(reason, priority, now).map(Some),
            RequestDecision::Deferred => Ok(None),
        }
    }

    /// Final high-priority snapshot before the host exits.
    ///
    /// Running timers stay running in the written state so they resume on next launch.
    pub fn shutdown(&mut self) -> Result<PathBuf> {
        let path = self.take_snapshot(APP_EXIT_REASON, SnapshotPriority::High, Instant::now())?;
        tracing::info!(path = %path.display(), "Timer engine shut down");
        Ok(path)
    }

    /// Save, snapshot, prune.
    fn take_snapshot(
        &mut self,
        reason: &str,
        priority: SnapshotPriority,
        now: Instant,
    ) -> Result<PathBuf> {
        let document = self.save()?;
        let path = self.snapshots.create(&document, reason, priority)?;
        self.scheduler.mark_done(now);
        self.snapshots.prune();
        Ok(path)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit monotonic time for the scheduler.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.ticks += 1;

        if self.settings.daily_reset_enabled() {
            self.roll_over_if_due(&mut report);
        }

        if self.autosave_every_ticks > 0 && self.ticks % u64::from(self.autosave_every_ticks) == 0
        {
            match self.save() {
                Ok(_) => report.autosaved = true,
                Err(err) => {
                    tracing::warn!(error = %err, "Autosave failed");
                    report.errors.push(format!("Failed to save state: {}", err));
                }
            }
        }

        if let Some(due) = self.scheduler.check(now) {
            match self.take_snapshot(&due.reason, due.priority, now) {
                Ok(path) => report.snapshot = Some(path),
                Err(err) => {
                    tracing::warn!(error = %err, reason = %due.reason, "Snapshot failed");
                    report.errors.push(format!("Failed to save snapshot: {}", err));
                }
            }
        }

        report
    }

    /// Finalizes the session and resets all timers if a daily boundary has passed.
    ///
    /// Timers are only reset once the completed session is on disk, so a failed
    /// write is retried on the next tick without losing the day's totals.
    fn roll_over_if_due(&mut self, report: &mut TickReport) {
        let Some(boundary) = self
            .finalizer
            .due(self.session_start, self.settings.daily_reset_time())
        else {
            return;
        };

        let document = self.document();
        match self.finalizer.finalize(&document, boundary) {
            Ok(path) => report.completed_session = Some(path),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to save completed session");
                report
                    .errors
                    .push(format!("Failed to save completed session: {}", err));
                return;
            }
        }

        self.reset_all();
        self.session_start = boundary;
        tracing::info!(boundary = %boundary, "Started new session after daily reset");

        match self.take_snapshot(DAILY_RESET_REASON, SnapshotPriority::High, Instant::now()) {
            Ok(path) => report.snapshot = Some(path),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to snapshot after daily reset");
                report.errors.push(format!("Failed to save snapshot: {}", err));
            }
        }
    }
}

fn min_interval(settings: &Settings) -> Duration {
    Duration::from_secs(settings.snapshot_min_minutes().saturating_mul(60))
}
