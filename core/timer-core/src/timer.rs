//! Per-row elapsed-time accounting.
//!
//! Duration is always measured on the monotonic clock ([`Instant`]). The
//! wall-clock `started_at` exists only so a running timer can be persisted as
//! `running_since` and restored later; it is never subtracted to compute time,
//! so system clock changes, DST and NTP steps cannot corrupt totals.
//!
//! A restored running timer accrues only from the moment of restore. Time that
//! passed while the process was not running is not added.

use std::time::Instant;

use chrono::{DateTime, FixedOffset, Local};

/// Tracks accumulated running time for one row.
#[derive(Debug, Clone)]
pub struct ElapsedTimer {
    id: i64,
    /// Seconds accumulated up to `anchor` (or in total, when stopped). Never negative.
    elapsed: f64,
    /// Monotonic anchor; `Some` iff running.
    anchor: Option<Instant>,
    started_at: Option<DateTime<FixedOffset>>,
}

impl ElapsedTimer {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            elapsed: 0.0,
            anchor: None,
            started_at: None,
        }
    }

    /// Restores a timer from persisted values.
    ///
    /// With `running_since` set, the timer comes back running, keeps that
    /// wall-clock value as `started_at`, and takes a fresh monotonic anchor.
    pub fn restore(id: i64, elapsed: f64, running_since: Option<DateTime<FixedOffset>>) -> Self {
        let mut timer = Self {
            id,
            elapsed: sanitize(elapsed),
            anchor: None,
            started_at: running_since,
        };
        if timer.started_at.is_some() {
            timer.start();
        }
        tracing::debug!(
            timer_id = id,
            elapsed = timer.elapsed,
            running = timer.is_running(),
            "Restored timer"
        );
        timer
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Stored seconds. Call [`freeze`](Self::freeze) first if the timer is running
    /// and the value is about to be persisted.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn started_at(&self) -> Option<DateTime<FixedOffset>> {
        self.started_at
    }

    /// Seconds including the in-flight running window. Display only; never persisted.
    pub fn current_elapsed(&self) -> f64 {
        match self.anchor {
            Some(anchor) => self.elapsed + anchor.elapsed().as_secs_f64(),
            None => self.elapsed,
        }
    }

    pub fn start(&mut self) {
        if self.anchor.is_some() {
            return;
        }
        self.anchor = Some(Instant::now());
        if self.started_at.is_none() {
            self.started_at = Some(Local::now().fixed_offset());
        }
        tracing::debug!(timer_id = self.id, "Started timer");
    }

    pub fn stop(&mut self) {
        if let Some(anchor) = self.anchor.take() {
            self.elapsed += anchor.elapsed().as_secs_f64();
            self.started_at = None;
            tracing::debug!(timer_id = self.id, elapsed = self.elapsed, "Stopped timer");
        }
    }

    /// Folds the running window into `elapsed` and re-anchors, without stopping.
    pub fn freeze(&mut self) {
        if let Some(anchor) = self.anchor {
            let now = Instant::now();
            self.elapsed += now.saturating_duration_since(anchor).as_secs_f64();
            self.anchor = Some(now);
        }
    }

    /// Adds `delta_seconds` (which may be negative), clamping the total at zero.
    pub fn adjust(&mut self, delta_seconds: f64) {
        self.freeze();
        self.elapsed = sanitize(self.elapsed + delta_seconds);
        tracing::debug!(
            timer_id = self.id,
            delta = delta_seconds,
            elapsed = self.elapsed,
            "Adjusted timer"
        );
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.started_at = None;
        self.elapsed = 0.0;
        tracing::debug!(timer_id = self.id, "Reset timer");
    }
}

fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}
