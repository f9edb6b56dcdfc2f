//! Statistics tracker — rolling window of applied rates.
//!
//! All state sits behind one `std::sync::Mutex`, independent of the
//! controller's lock. Every operation is a short, bounded critical
//! section, so the tracker can be shared freely between the controller
//! and the reporting timers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

/// Window capacity: about five minutes at one sample per second.
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// Immutable view of the tracker, built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Most recent sample, or 0 if none.
    pub current_rate: i32,
    /// Mean over the rolling window.
    pub average_rate: f64,
    /// Highest rate ever recorded, or 0 if none.
    pub peak_rate: i32,
    /// Lowest rate ever recorded, or 0 if none.
    pub min_rate: i32,
    /// Committed changes per hour since the last window reset.
    pub changes_per_hour: f64,
    /// Seconds since the rate last touched the ceiling (0 if never).
    pub secs_since_max: f64,
    /// Seconds since the rate last touched the floor (0 if never).
    pub secs_since_min: f64,
    /// Seconds since `peak_rate` was first recorded (0 if none).
    pub secs_since_peak: f64,
    /// Seconds since `min_rate` was first recorded (0 if none).
    pub secs_since_min_sample: f64,
    /// Samples recorded over the tracker's lifetime.
    pub sample_count: u64,
    /// Samples currently held in the rolling window.
    pub history_size: usize,
}

struct TrackerState {
    history: VecDeque<i32>,
    peak: Option<(i32, Instant)>,
    min: Option<(i32, Instant)>,
    last_at_max: Option<Instant>,
    last_at_min: Option<Instant>,
    /// Start of the current changes-per-hour window.
    window_start: Instant,
    change_count: u64,
    total_samples: u64,
}

/// Records applied rates and answers snapshot queries.
pub struct StatisticsTracker {
    state: Mutex<TrackerState>,
    capacity: usize,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a tracker whose rolling window holds at most `capacity`
    /// samples (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(TrackerState {
                history: VecDeque::with_capacity(capacity),
                peak: None,
                min: None,
                last_at_max: None,
                last_at_min: None,
                window_start: Instant::now(),
                change_count: 0,
                total_samples: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an applied rate, dropping the oldest sample on overflow.
    pub fn record_applied(&self, rate: i32) {
        self.record_applied_at(rate, Instant::now());
    }

    pub fn record_applied_at(&self, rate: i32, now: Instant) {
        let mut s = self.state();
        s.total_samples += 1;

        if s.peak.is_none_or(|(peak, _)| rate > peak) {
            s.peak = Some((rate, now));
        }
        if s.min.is_none_or(|(min, _)| rate < min) {
            s.min = Some((rate, now));
        }

        s.history.push_back(rate);
        while s.history.len() > self.capacity {
            s.history.pop_front();
        }
    }

    /// Count one committed change toward changes-per-hour.
    pub fn record_change(&self) {
        self.state().change_count += 1;
    }

    /// Refresh the "last time at max/min" markers if `rate` touches
    /// either bound.
    pub fn update_extreme_tracking(&self, rate: i32, min_rate: i32, max_rate: i32) {
        self.update_extreme_tracking_at(rate, min_rate, max_rate, Instant::now());
    }

    pub fn update_extreme_tracking_at(
        &self,
        rate: i32,
        min_rate: i32,
        max_rate: i32,
        now: Instant,
    ) {
        let mut s = self.state();
        if rate >= max_rate {
            s.last_at_max = Some(now);
        }
        if rate <= min_rate {
            s.last_at_min = Some(now);
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> StatisticsSnapshot {
        let s = self.state();

        let average_rate = if s.history.is_empty() {
            0.0
        } else {
            s.history.iter().map(|&r| r as f64).sum::<f64>() / s.history.len() as f64
        };

        let changes_per_hour = if s.total_samples > 0 {
            let window = now.saturating_duration_since(s.window_start).as_secs_f64();
            s.change_count as f64 * 3600.0 / window.max(1.0)
        } else {
            0.0
        };

        StatisticsSnapshot {
            current_rate: s.history.back().copied().unwrap_or(0),
            average_rate,
            peak_rate: s.peak.map_or(0, |(rate, _)| rate),
            min_rate: s.min.map_or(0, |(rate, _)| rate),
            changes_per_hour,
            secs_since_max: elapsed_secs(s.last_at_max, now),
            secs_since_min: elapsed_secs(s.last_at_min, now),
            secs_since_peak: elapsed_secs(s.peak.map(|(_, at)| at), now),
            secs_since_min_sample: elapsed_secs(s.min.map(|(_, at)| at), now),
            sample_count: s.total_samples,
            history_size: s.history.len(),
        }
    }

    /// Zero the change counter and restart the changes-per-hour clock.
    pub fn reset_window(&self) {
        self.reset_window_at(Instant::now());
    }

    pub fn reset_window_at(&self, now: Instant) {
        let mut s = self.state();
        debug!(changes = s.change_count, "statistics window reset");
        s.change_count = 0;
        s.window_start = now;
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn elapsed_secs(since: Option<Instant>, now: Instant) -> f64 {
    since.map_or(0.0, |t| now.saturating_duration_since(t).as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_snapshot_is_zeroed() {
        let tracker = StatisticsTracker::new();
        let snap = tracker.snapshot();
        assert_eq!(snap.current_rate, 0);
        assert_eq!(snap.average_rate, 0.0);
        assert_eq!(snap.peak_rate, 0);
        assert_eq!(snap.min_rate, 0);
        assert_eq!(snap.changes_per_hour, 0.0);
        assert_eq!(snap.secs_since_max, 0.0);
        assert_eq!(snap.secs_since_peak, 0.0);
        assert_eq!(snap.sample_count, 0);
        assert_eq!(snap.history_size, 0);
    }

    #[test]
    fn records_current_average_peak_min() {
        let tracker = StatisticsTracker::new();
        for rate in [30, 45, 60, 40] {
            tracker.record_applied(rate);
        }

        let snap = tracker.snapshot();
        assert_eq!(snap.current_rate, 40);
        assert_eq!(snap.average_rate, 43.75);
        assert_eq!(snap.peak_rate, 60);
        assert_eq!(snap.min_rate, 30);
        assert_eq!(snap.sample_count, 4);
        assert_eq!(snap.history_size, 4);
    }

    #[test]
    fn peak_and_min_remember_when_they_were_set() {
        let tracker = StatisticsTracker::new();
        let t0 = Instant::now();
        tracker.record_applied_at(40, t0);
        tracker.record_applied_at(60, t0 + Duration::from_secs(10));
        tracker.record_applied_at(35, t0 + Duration::from_secs(20));
        // Equal values do not move the timestamps.
        tracker.record_applied_at(60, t0 + Duration::from_secs(30));
        tracker.record_applied_at(35, t0 + Duration::from_secs(40));

        let snap = tracker.snapshot_at(t0 + Duration::from_secs(100));
        assert_eq!(snap.peak_rate, 60);
        assert_eq!(snap.secs_since_peak, 90.0);
        assert_eq!(snap.min_rate, 35);
        assert_eq!(snap.secs_since_min_sample, 80.0);
    }

    #[test]
    fn window_drops_oldest_on_overflow() {
        let tracker = StatisticsTracker::with_capacity(3);
        for rate in [10, 20, 30, 40, 50] {
            tracker.record_applied(rate);
        }

        let snap = tracker.snapshot();
        assert_eq!(snap.history_size, 3);
        assert_eq!(snap.average_rate, 40.0);
        // Peak and min cover the whole lifetime, not just the window.
        assert_eq!(snap.min_rate, 10);
        assert_eq!(snap.peak_rate, 50);
        assert_eq!(snap.sample_count, 5);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let tracker = StatisticsTracker::with_capacity(0);
        assert_eq!(tracker.capacity(), 1);
        tracker.record_applied(30);
        tracker.record_applied(35);
        assert_eq!(tracker.snapshot().history_size, 1);
    }

    #[test]
    fn changes_per_hour_over_window() {
        let tracker = StatisticsTracker::new();
        let start = Instant::now();
        tracker.reset_window_at(start);

        tracker.record_applied_at(40, start);
        for _ in 0..5 {
            tracker.record_change();
        }

        // 5 changes in 10 minutes → 30 per hour.
        let snap = tracker.snapshot_at(start + Duration::from_secs(600));
        assert!((snap.changes_per_hour - 30.0).abs() < 1e-9);
    }

    #[test]
    fn changes_per_hour_needs_a_sample() {
        let tracker = StatisticsTracker::new();
        tracker.record_change();
        assert_eq!(tracker.snapshot().changes_per_hour, 0.0);
    }

    #[test]
    fn changes_per_hour_short_window_uses_one_second_floor() {
        let tracker = StatisticsTracker::new();
        let start = Instant::now();
        tracker.reset_window_at(start);
        tracker.record_applied_at(40, start);
        tracker.record_change();

        let snap = tracker.snapshot_at(start);
        assert_eq!(snap.changes_per_hour, 3600.0);
    }

    #[test]
    fn reset_window_clears_change_count() {
        let tracker = StatisticsTracker::new();
        let start = Instant::now();
        tracker.reset_window_at(start);
        tracker.record_applied_at(40, start);
        tracker.record_change();
        tracker.record_change();

        let later = start + Duration::from_secs(120);
        tracker.reset_window_at(later);
        let snap = tracker.snapshot_at(later + Duration::from_secs(60));
        assert_eq!(snap.changes_per_hour, 0.0);
        // Samples survive a reset.
        assert_eq!(snap.sample_count, 1);
    }

    #[test]
    fn extreme_tracking_reports_elapsed_seconds() {
        let tracker = StatisticsTracker::new();
        let t0 = Instant::now();

        tracker.update_extreme_tracking_at(144, 30, 144, t0);
        tracker.update_extreme_tracking_at(30, 30, 144, t0 + Duration::from_secs(40));
        // Between the bounds: neither marker moves.
        tracker.update_extreme_tracking_at(80, 30, 144, t0 + Duration::from_secs(50));

        let snap = tracker.snapshot_at(t0 + Duration::from_secs(100));
        assert_eq!(snap.secs_since_max, 100.0);
        assert_eq!(snap.secs_since_min, 60.0);
    }

    #[test]
    fn snapshot_serializes() {
        let tracker = StatisticsTracker::new();
        tracker.record_applied(42);
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["current_rate"], 42);
        assert_eq!(json["history_size"], 1);
    }

    #[test]
    fn concurrent_recording() {
        let tracker = std::sync::Arc::new(StatisticsTracker::with_capacity(10_000));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tracker.record_applied(30 + i);
                        tracker.record_change();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = tracker.snapshot();
        assert_eq!(snap.sample_count, 1000);
        assert_eq!(snap.history_size, 1000);
        assert_eq!(snap.peak_rate, 33);
        assert_eq!(snap.min_rate, 30);
    }
}
