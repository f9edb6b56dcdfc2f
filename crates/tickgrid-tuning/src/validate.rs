//! Range and consistency checks for a [`Tuning`].
//!
//! Issues are diagnostics for the operator. The controller runs with
//! whatever values it was given; the runtime clamps keep the output rate
//! inside `[min_rate, max_rate]` regardless.

use std::fmt;

use crate::Tuning;

/// Rates above this are allowed but reported.
const HIGH_MAX_RATE: i32 = 200;

/// A single out-of-range or contradictory setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// The offending field name, as written in `tickgrid.toml`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &'static str, message: String) -> Self {
        Self { field, message }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Inspect a tuning and report every suspicious setting.
///
/// Returns an empty list for a sane configuration. Never mutates.
pub fn validate(t: &Tuning) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if t.min_rate >= t.max_rate {
        issues.push(ValidationIssue::new(
            "min_rate",
            format!(
                "min_rate ({}) must be less than max_rate ({})",
                t.min_rate, t.max_rate
            ),
        ));
    }
    if t.min_rate < 1 {
        issues.push(ValidationIssue::new(
            "min_rate",
            format!("min_rate ({}) must be at least 1", t.min_rate),
        ));
    }
    if t.max_rate > HIGH_MAX_RATE {
        issues.push(ValidationIssue::new(
            "max_rate",
            format!(
                "max_rate ({}) is very high (>{HIGH_MAX_RATE}), ensure the host can sustain it",
                t.max_rate
            ),
        ));
    }

    check_unit_interval(&mut issues, "ema_alpha", t.ema_alpha);
    check_unit_interval(&mut issues, "soft_cap_diminish", t.soft_cap_diminish);

    check_non_negative(&mut issues, "added_per_participant", t.added_per_participant);
    check_non_negative(
        &mut issues,
        "added_per_extra_active_session",
        t.added_per_extra_active_session,
    );
    check_non_negative(&mut issues, "busy_session_weight", t.busy_session_weight);
    check_non_negative(&mut issues, "join_rate_ticks_per_jpm", t.join_rate_ticks_per_jpm);
    check_non_negative(&mut issues, "join_rate_max_bonus", t.join_rate_max_bonus);

    for (field, value) in [
        ("active_session_threshold", t.active_session_threshold),
        ("hysteresis_ticks", t.hysteresis_ticks),
        ("min_change_interval_seconds", t.min_change_interval_seconds),
        ("big_jump_threshold", t.big_jump_threshold),
        ("big_jump_cooldown_seconds", t.big_jump_cooldown_seconds),
    ] {
        if value < 0 {
            issues.push(ValidationIssue::new(
                field,
                format!("{field} ({value}) should be non-negative"),
            ));
        }
    }

    for (field, value) in [
        ("top_k_sessions", t.top_k_sessions),
        ("per_session_soft_cap", t.per_session_soft_cap),
        ("join_window_seconds", t.join_window_seconds),
    ] {
        if value < 1 {
            issues.push(ValidationIssue::new(
                field,
                format!("{field} ({value}) should be at least 1"),
            ));
        }
    }

    issues
}

fn check_unit_interval(issues: &mut Vec<ValidationIssue>, field: &'static str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        issues.push(ValidationIssue::new(
            field,
            format!("{field} ({value}) should be between 0 and 1"),
        ));
    }
}

fn check_non_negative(issues: &mut Vec<ValidationIssue>, field: &'static str, value: f64) {
    if value.is_nan() || value < 0.0 {
        issues.push(ValidationIssue::new(
            field,
            format!("{field} ({value}) should be non-negative"),
        ));
    }
}
