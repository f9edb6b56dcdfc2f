//! Health check logic.
//!
//! Looks at the current rate and a statistics snapshot and decides which
//! operator warnings are due, with per-warning rate limits.

use std::fmt;
use std::time::{Duration, Instant};

use tickgrid_stats::StatisticsSnapshot;
use tickgrid_tuning::Tuning;

/// Minimum gap between pinned-at-max warnings.
const PINNED_WARNING_GAP: Duration = Duration::from_secs(5 * 60);
/// Minimum gap between fluctuation warnings.
const FLUCTUATION_WARNING_GAP: Duration = Duration::from_secs(10 * 60);
/// Window samples needed before fluctuation is judged.
const FLUCTUATION_MIN_HISTORY: usize = 60;
/// More than two changes a minute on average.
const FLUCTUATION_CHANGES_PER_HOUR: f64 = 120.0;
/// Identical consecutive checks before a rate counts as stuck.
const STUCK_CHECKS: u32 = 6;

/// A condition the operator should look at.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthWarning {
    /// The rate sits at the ceiling.
    PinnedAtMax { max_rate: i32, minutes: f64 },
    /// The rate changes too often.
    HighFluctuation { changes_per_hour: f64 },
    /// The rate has not moved for many checks while above the floor.
    Stuck { rate: i32, checks: u32 },
}

impl fmt::Display for HealthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthWarning::PinnedAtMax { max_rate, minutes } => write!(
                f,
                "rate has been at maximum ({max_rate}) for {minutes:.1} minutes; \
                 consider raising max_rate if the host has headroom"
            ),
            HealthWarning::HighFluctuation { changes_per_hour } => write!(
                f,
                "high rate fluctuation ({changes_per_hour:.1} changes/hour); \
                 consider adjusting ema_alpha, hysteresis_ticks, or min_change_interval_seconds"
            ),
            HealthWarning::Stuck { rate, checks } => write!(
                f,
                "rate has been stable at {rate} for {checks} health checks; \
                 it may not be responding to activity"
            ),
        }
    }
}

/// Tracks what previous checks saw, for rate-limiting and stuck detection.
#[derive(Debug, Default)]
pub struct HealthChecker {
    last_rate: Option<i32>,
    stable_count: u32,
    /// Shared by the pinned and fluctuation warnings.
    last_warning: Option<Instant>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one health check and return the warnings that are due.
    pub fn check(
        &mut self,
        current_rate: i32,
        tuning: &Tuning,
        snapshot: &StatisticsSnapshot,
        now: Instant,
    ) -> Vec<HealthWarning> {
        let mut warnings = Vec::new();

        if tuning.is_at_max(current_rate) && self.warning_due(now, PINNED_WARNING_GAP) {
            warnings.push(HealthWarning::PinnedAtMax {
                max_rate: tuning.max_rate,
                minutes: snapshot.secs_since_max / 60.0,
            });
            self.last_warning = Some(now);
        }

        if snapshot.history_size >= FLUCTUATION_MIN_HISTORY
            && snapshot.changes_per_hour > FLUCTUATION_CHANGES_PER_HOUR
            && self.warning_due(now, FLUCTUATION_WARNING_GAP)
        {
            warnings.push(HealthWarning::HighFluctuation {
                changes_per_hour: snapshot.changes_per_hour,
            });
            self.last_warning = Some(now);
        }

        if self.last_rate == Some(current_rate) {
            self.stable_count += 1;
            // Sitting at the floor while idle is normal.
            if self.stable_count >= STUCK_CHECKS && !tuning.is_at_min(current_rate) {
                warnings.push(HealthWarning::Stuck {
                    rate: current_rate,
                    checks: self.stable_count,
                });
                self.stable_count = 0;
            }
        } else {
            self.stable_count = 0;
            self.last_rate = Some(current_rate);
        }

        warnings
    }

    fn warning_due(&self, now: Instant, gap: Duration) -> bool {
        self.last_warning
            .is_none_or(|last| now.saturating_duration_since(last) >= gap)
    }
}
