//! Debounce/coalesce decisions for when to snapshot.
//!
//! Pure state machine: no I/O and no clock reads. Every call takes `now`, so the
//! host drives it from its tick and tests drive it with synthetic instants.
//!
//! ```text
//! request(low|medium) ──► dirty(reason, at) ──┐
//!                                             ├─ check(): debounce elapsed since
//! request(high) ──► FireNow (state untouched) │   last activity AND min interval
//!                                             │   elapsed since last snapshot
//! (idle) ─────────────────────────────────────┴─ check(): min interval elapsed ──► "periodic"
//! ```
//!
//! Pending activity holds back the heartbeat until its debounce has elapsed, so
//! a burst is always flushed under its own (latest) reason.

use std::time::{Duration, Instant};

use crate::state::SnapshotPriority;

pub const PERIODIC_REASON: &str = "periodic";

/// Answer to [`SnapshotScheduler::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Snapshot immediately; the scheduler's pending state was not changed.
    FireNow,
    /// Recorded as pending; a later [`SnapshotScheduler::check`] will fire it.
    Deferred,
}

/// A snapshot that [`SnapshotScheduler::check`] says is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueSnapshot {
    pub reason: String,
    pub priority: SnapshotPriority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingActivity {
    reason: String,
    priority: SnapshotPriority,
    at: Instant,
}

#[derive(Debug, Clone)]
pub struct SnapshotScheduler {
    pending: Option<PendingActivity>,
    last_snapshot: Instant,
    debounce: Duration,
    min_interval: Duration,
}

impl SnapshotScheduler {
    /// `now` counts as the last snapshot time, so the first periodic snapshot
    /// comes one `min_interval` after construction.
    pub fn new(min_interval: Duration, debounce: Duration, now: Instant) -> Self {
        Self {
            pending: None,
            last_snapshot: now,
            debounce,
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_reason(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.reason.as_str())
    }

    pub fn request(
        &mut self,
        reason: &str,
        priority: SnapshotPriority,
        now: Instant,
    ) -> RequestDecision {
        if priority == SnapshotPriority::High {
            return RequestDecision::FireNow;
        }
        self.pending = Some(PendingActivity {
            reason: reason.to_string(),
            priority,
            at: now,
        });
        RequestDecision::Deferred
    }

    /// Called once per tick.
    pub fn check(&self, now: Instant) -> Option<DueSnapshot> {
        let interval_elapsed =
            now.saturating_duration_since(self.last_snapshot) >= self.min_interval;
        if !interval_elapsed {
            return None;
        }

        match &self.pending {
            Some(pending) if now.saturating_duration_since(pending.at) >= self.debounce => {
                Some(DueSnapshot {
                    reason: pending.reason.clone(),
                    priority: pending.priority,
                })
            }
            // Still settling.
            Some(_) => None,
            None => Some(DueSnapshot {
                reason: PERIODIC_REASON.to_string(),
                priority: SnapshotPriority::Low,
            }),
        }
    }

    /// Called after a snapshot was actually written.
    pub fn mark_done(&mut self, now: Instant) {
        self.pending = None;
        self.last_snapshot = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_high_priority_fires_immediately_without_touching_state() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(300), secs(30), t0);
        sched.request("layout_change", SnapshotPriority::Low, t0);
        let decision = sched.request("app_exit", SnapshotPriority::High, t0);
        assert_eq!(decision, RequestDecision::FireNow);
        assert!(sched.is_dirty());
        assert_eq!(sched.pending_reason(), Some("layout_change"));
    }

    #[test]
    fn test_normal_priority_is_deferred() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(300), secs(30), t0);
        assert_eq!(
            sched.request("layout_change", SnapshotPriority::Medium, t0),
            RequestDecision::Deferred
        );
        assert!(sched.is_dirty());
    }

    #[test]
    fn test_check_fires_after_debounce_and_interval() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(60), secs(10), t0);
        sched.request("layout_change", SnapshotPriority::Medium, t0 + secs(30));
        assert_eq!(sched.check(t0 + secs(45)), None);
        let due = sched.check(t0 + secs(60)).unwrap();
        assert_eq!(due.reason, "layout_change");
        assert_eq!(due.priority, SnapshotPriority::Medium);
    }

    #[test]
    fn test_check_does_not_fire_during_debounce() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(9999), secs(10), t0);
        sched.mark_done(t0);
        sched.request("layout_change", SnapshotPriority::Low, t0);
        assert_eq!(sched.check(t0), None);
    }

    #[test]
    fn test_check_does_not_fire_during_min_interval() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(10), Duration::ZERO, t0);
        sched.mark_done(t0);
        sched.request("layout_change", SnapshotPriority::Low, t0);
        assert_eq!(sched.check(t0 + secs(5)), None);
        assert!(sched.check(t0 + secs(10)).is_some());
    }

    #[test]
    fn test_periodic_fires_when_not_dirty() {
        let t0 = Instant::now();
        let sched = SnapshotScheduler::new(secs(60), secs(30), t0);
        assert_eq!(sched.check(t0 + secs(59)), None);
        let due = sched.check(t0 + secs(60)).unwrap();
        assert_eq!(due.reason, PERIODIC_REASON);
        assert_eq!(due.priority, SnapshotPriority::Low);
    }

    #[test]
    fn test_burst_straddling_interval_fires_latest_reason() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(60), secs(10), t0);
        sched.request("reason_1", SnapshotPriority::Low, t0 + secs(55));
        sched.request("reason_2", SnapshotPriority::Low, t0 + secs(58));

        let mut fired = Vec::new();
        for tick in 59..=200u64 {
            let now = t0 + secs(tick);
            if let Some(due) = sched.check(now) {
                fired.push((tick, due.reason));
                sched.mark_done(now);
            }
        }
        assert_eq!(fired[0], (68, "reason_2".to_string()));
        assert!(fired[1..].iter().all(|(_, reason)| reason == PERIODIC_REASON));
    }

    #[test]
    fn test_mark_done_resets_state() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(10), Duration::ZERO, t0);
        sched.request("layout_change", SnapshotPriority::Low, t0);
        assert!(sched.is_dirty());
        sched.mark_done(t0 + secs(1));
        assert!(!sched.is_dirty());
        assert_eq!(sched.pending_reason(), None);
        assert_eq!(sched.check(t0 + secs(5)), None);
    }

    #[test]
    fn test_debounce_coalesces_rapid_requests() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(5), secs(10), t0);
        sched.request("reason_1", SnapshotPriority::Low, t0);
        sched.request("reason_2", SnapshotPriority::Low, t0 + secs(1));
        sched.request("reason_3", SnapshotPriority::Low, t0 + secs(2));

        let later = t0 + secs(20);
        let due = sched.check(later).unwrap();
        assert_eq!(due.reason, "reason_3");
        sched.mark_done(later);
        // Fired once; nothing pending until the next interval.
        assert_eq!(sched.check(later + secs(1)), None);
    }

    #[test]
    fn test_min_interval_spacing_without_high_priority() {
        let t0 = Instant::now();
        let mut sched = SnapshotScheduler::new(secs(30), secs(2), t0);
        let mut fired = Vec::new();
        for tick in 0..200u64 {
            let now = t0 + secs(tick);
            if tick % 3 == 0 {
                sched.request("edit", SnapshotPriority::Medium, now);
            }
            if sched.check(now).is_some() {
                fired.push(tick);
                sched.mark_done(now);
            }
        }
        assert!(!fired.is_empty());
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= 30, "{:?}", fired);
        }
    }
}
