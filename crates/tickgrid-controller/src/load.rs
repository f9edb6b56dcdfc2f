//! Weighted load aggregation for the active path.

use tickgrid_tuning::Tuning;

/// The contributions that make up one raw rate target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadBreakdown {
    /// Weighted, soft-capped participant load.
    pub busy_load: f64,
    pub user_ticks: f64,
    pub session_ticks: f64,
    pub join_ticks: f64,
    /// `min_rate` plus every contribution, clamped to the rate bounds.
    pub raw: f64,
}

impl LoadBreakdown {
    /// Compute the raw target for `active` participant counts, which must
    /// already be sorted busiest first.
    pub fn compute(t: &Tuning, active: &[u32], joins_per_minute: f64) -> Self {
        let busy_load: f64 = active
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let weight = if (i as i64) < i64::from(t.top_k_sessions) {
                    t.busy_session_weight
                } else {
                    1.0
                };
                weight * effective_participants(t, count)
            })
            .sum();

        let user_ticks = busy_load * t.added_per_participant;
        let extra_sessions = active.len().saturating_sub(1);
        let session_ticks = extra_sessions as f64 * t.added_per_extra_active_session;
        let join_ticks = join_ticks(t, joins_per_minute);

        let raw = t.clamp_rate(t.min_rate as f64 + user_ticks + session_ticks + join_ticks);

        Self {
            busy_load,
            user_ticks,
            session_ticks,
            join_ticks,
            raw,
        }
    }
}

/// Participants beyond the soft cap count only `soft_cap_diminish` each.
pub fn effective_participants(t: &Tuning, count: u32) -> f64 {
    let count = i64::from(count);
    let cap = i64::from(t.per_session_soft_cap);
    let base = count.min(cap);
    let overflow = (count - cap).max(0);
    base as f64 + overflow as f64 * t.soft_cap_diminish
}

/// Join-burst bonus, capped at `join_rate_max_bonus`.
pub fn join_ticks(t: &Tuning, joins_per_minute: f64) -> f64 {
    (joins_per_minute * t.join_rate_ticks_per_jpm).min(t.join_rate_max_bonus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning {
            min_rate: 30,
            max_rate: 90,
            added_per_participant: 0.65,
            added_per_extra_active_session: 1.8,
            top_k_sessions: 2,
            busy_session_weight: 1.6,
            per_session_soft_cap: 16,
            soft_cap_diminish: 0.4,
            join_rate_ticks_per_jpm: 2.5,
            join_rate_max_bonus: 40.0,
            ..Tuning::default()
        }
    }

    #[test]
    fn single_busy_session() {
        let load = LoadBreakdown::compute(&tuning(), &[5], 0.0);
        assert!((load.busy_load - 8.0).abs() < 1e-9);
        assert!((load.raw - 35.2).abs() < 1e-9);
        assert_eq!(load.session_ticks, 0.0);
    }

    #[test]
    fn two_sessions_both_in_top_k() {
        let load = LoadBreakdown::compute(&tuning(), &[5, 3], 0.0);
        assert!((load.busy_load - 12.8).abs() < 1e-9);
        assert!((load.user_ticks - 8.32).abs() < 1e-9);
        assert!((load.session_ticks - 1.8).abs() < 1e-9);
        assert!((load.raw - 40.12).abs() < 1e-9);
    }

    #[test]
    fn sessions_beyond_top_k_get_unit_weight() {
        let load = LoadBreakdown::compute(&tuning(), &[4, 4, 4], 0.0);
        // 1.6*4 + 1.6*4 + 1.0*4
        assert!((load.busy_load - 16.8).abs() < 1e-9);
    }

    #[test]
    fn soft_cap_diminishes_overflow() {
        let t = tuning();
        assert_eq!(effective_participants(&t, 10), 10.0);
        assert_eq!(effective_participants(&t, 16), 16.0);
        assert!((effective_participants(&t, 26) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn join_bonus_is_capped() {
        let t = tuning();
        assert_eq!(join_ticks(&t, 4.0), 10.0);
        assert_eq!(join_ticks(&t, 100.0), 40.0);
    }

    #[test]
    fn raw_is_clamped_to_max() {
        let load = LoadBreakdown::compute(&tuning(), &[200, 150, 90], 60.0);
        assert_eq!(load.raw, 90.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Tunings the validator accepts, with bounds in either order.
        fn valid_shape() -> impl Strategy<Value = Tuning> {
            (
                (1i32..80, 1i32..120),
                (0.0f64..2.0, 0.0f64..4.0, 0.0f64..3.0),
                (1i32..5, 1i32..32, 0.0f64..=1.0),
            )
                .prop_map(|((min, max), (per_p, per_s, busy), (top_k, cap, dim))| Tuning {
                    min_rate: min,
                    max_rate: max,
                    added_per_participant: per_p,
                    added_per_extra_active_session: per_s,
                    busy_session_weight: busy,
                    top_k_sessions: top_k,
                    per_session_soft_cap: cap,
                    soft_cap_diminish: dim,
                    ..Tuning::default()
                })
        }

        fn sorted_desc(mut active: Vec<u32>) -> Vec<u32> {
            active.sort_unstable_by(|a, b| b.cmp(a));
            active
        }

        proptest! {
            #[test]
            fn raw_never_decreases_as_one_session_grows(
                t in valid_shape(),
                others in prop::collection::vec(1u32..200, 0..6),
                n in 1u32..300,
                jpm in 0.0f64..30.0,
            ) {
                let mut before = others.clone();
                before.push(n);
                let mut after = others;
                after.push(n + 1);

                let lo = LoadBreakdown::compute(&t, &sorted_desc(before), jpm).raw;
                let hi = LoadBreakdown::compute(&t, &sorted_desc(after), jpm).raw;
                prop_assert!(hi >= lo, "raw dropped from {} to {} at n={}", lo, hi, n);
            }

            #[test]
            fn raw_stays_within_bounds(
                t in valid_shape(),
                active in prop::collection::vec(1u32..500, 1..8),
                jpm in 0.0f64..100.0,
            ) {
                let raw = LoadBreakdown::compute(&t, &sorted_desc(active), jpm).raw;
                let floor = t.min_rate as f64;
                let ceiling = (t.max_rate as f64).max(floor);
                prop_assert!(raw >= floor && raw <= ceiling, "raw {} outside [{}, {}]", raw, floor, ceiling);
            }
        }
    }
}
