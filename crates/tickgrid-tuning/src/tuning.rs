//! The tuning value object.

use serde::{Deserialize, Serialize};

/// Numeric knobs for the rate controller.
///
/// Integer knobs are signed on purpose: a config file may carry values
/// that [`crate::validate`] flags as out of range, and the controller
/// still runs with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // Hard caps
    /// Floor for the output rate.
    pub min_rate: i32,
    /// Ceiling for the output rate.
    pub max_rate: i32,

    // Linear load
    /// Rate added per weighted participant.
    pub added_per_participant: f64,
    /// Rate added per active session beyond the first.
    pub added_per_extra_active_session: f64,

    /// Non-owner participants needed for a session to count as active.
    pub active_session_threshold: i32,

    // Busy-session shaping
    /// How many of the busiest active sessions get `busy_session_weight`.
    pub top_k_sessions: i32,
    pub busy_session_weight: f64,
    /// Participants per session before each extra one counts less.
    pub per_session_soft_cap: i32,
    /// Weight of participants above the soft cap (0..1).
    pub soft_cap_diminish: f64,

    // Join bursts
    pub join_rate_ticks_per_jpm: f64,
    pub join_rate_max_bonus: f64,
    pub join_window_seconds: i32,

    // Stability
    /// EMA smoothing factor, 0 (ignore new signal) to 1 (no smoothing).
    pub ema_alpha: f64,
    pub hysteresis_ticks: i32,
    pub min_change_interval_seconds: i32,
    /// A committed change at least this large starts a cooldown.
    pub big_jump_threshold: i32,
    pub big_jump_cooldown_seconds: i32,

    /// Snap to `min_rate` as soon as no session is active.
    pub instant_idle_drop: bool,
    /// Log a line for every committed change.
    pub log_on_change: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_rate: 30,
            max_rate: 144,
            added_per_participant: 0.6,
            added_per_extra_active_session: 1.5,
            active_session_threshold: 1,
            top_k_sessions: 2,
            busy_session_weight: 1.75,
            per_session_soft_cap: 16,
            soft_cap_diminish: 0.35,
            join_rate_ticks_per_jpm: 4.0,
            join_rate_max_bonus: 40.0,
            join_window_seconds: 45,
            ema_alpha: 0.22,
            hysteresis_ticks: 2,
            min_change_interval_seconds: 5,
            big_jump_threshold: 12,
            big_jump_cooldown_seconds: 12,
            instant_idle_drop: false,
            log_on_change: true,
        }
    }
}

impl Tuning {
    /// Join-history window in seconds, never less than one.
    pub fn join_window_secs(&self) -> u64 {
        self.join_window_seconds.max(1) as u64
    }

    /// Joins-per-minute scale factor for a history of `count` joins.
    pub fn joins_per_minute(&self, count: usize) -> f64 {
        count as f64 * (60.0 / self.join_window_secs() as f64)
    }

    /// Clamp a raw value into `[min_rate, max_rate]`.
    ///
    /// Unlike `f64::clamp` this does not panic when the bounds are
    /// inverted; the floor wins in that case.
    pub fn clamp_rate(&self, value: f64) -> f64 {
        value.min(self.max_rate as f64).max(self.min_rate as f64)
    }

    /// Whether `rate` sits at or above the ceiling.
    pub fn is_at_max(&self, rate: i32) -> bool {
        rate >= self.max_rate
    }

    /// Whether `rate` sits at or below the floor.
    pub fn is_at_min(&self, rate: i32) -> bool {
        rate <= self.min_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_config() {
        let t = Tuning::default();
        assert_eq!(t.min_rate, 30);
        assert_eq!(t.max_rate, 144);
        assert_eq!(t.join_window_seconds, 45);
        assert!(!t.instant_idle_drop);
        assert!(t.log_on_change);
    }

    #[test]
    fn join_window_floor_is_one_second() {
        let t = Tuning {
            join_window_seconds: 0,
            ..Tuning::default()
        };
        assert_eq!(t.join_window_secs(), 1);
        assert_eq!(t.joins_per_minute(2), 120.0);
    }

    #[test]
    fn joins_per_minute_scales_to_window() {
        let t = Tuning {
            join_window_seconds: 30,
            ..Tuning::default()
        };
        assert_eq!(t.joins_per_minute(3), 6.0);
    }

    #[test]
    fn clamp_rate_handles_inverted_bounds() {
        let t = Tuning {
            min_rate: 60,
            max_rate: 30,
            ..Tuning::default()
        };
        assert_eq!(t.clamp_rate(45.0), 60.0);
        assert_eq!(t.clamp_rate(10.0), 60.0);
    }

    #[test]
    fn clamp_rate_within_bounds() {
        let t = Tuning::default();
        assert_eq!(t.clamp_rate(10.0), 30.0);
        assert_eq!(t.clamp_rate(200.0), 144.0);
        assert_eq!(t.clamp_rate(72.5), 72.5);
    }
}
