//! Rate controller — turns occupancy into committed rate changes.
//!
//! Every public event handler takes the controller lock for its whole
//! duration, including the recompute and the write to the host rate, so
//! events are applied in delivery order and each recompute sees a
//! consistent occupancy map. Statistics and the change callback run after
//! the lock is released; each commit carries a sequence number so a late
//! publish never overwrites the sample of a newer commit.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use tickgrid_stats::StatisticsTracker;
use tickgrid_tuning::Tuning;

use crate::load::LoadBreakdown;
use crate::sink::RateSink;

/// Callback invoked after every committed change of the rate.
pub type ChangeCallback = Arc<dyn Fn(&RateChange) + Send + Sync>;

/// A committed rate and the signals that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub rate: i32,
    pub previous: i32,
    /// Pre-smoothing target (`min_rate` on the idle path).
    pub raw: f64,
    pub smoothed: f64,
    pub active_sessions: usize,
    pub joins_per_minute: f64,
    /// True when no session was active.
    pub idle: bool,
    pub at: Instant,
}

impl RateChange {
    pub fn delta(&self) -> i64 {
        i64::from(self.rate) - i64::from(self.previous)
    }
}

/// Why a recompute did not commit its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// A big jump happened recently.
    Cooldown,
    /// The change is too small and too soon after the last one.
    Hysteresis,
}

/// Outcome of a single event.
#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    /// The candidate passed the gate and was written to the host.
    Applied(RateChange),
    /// The candidate was discarded.
    Held(HoldReason),
    /// The event did not change occupancy; nothing was recomputed.
    Unchanged,
}

impl RateDecision {
    pub fn applied(&self) -> Option<&RateChange> {
        match self {
            RateDecision::Applied(change) => Some(change),
            _ => None,
        }
    }
}

/// Occupancy counts for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    /// Sessions currently known to the controller.
    pub sessions: usize,
    pub active_sessions: usize,
    /// Non-owner participants across all sessions.
    pub participants: u64,
}

/// Non-owner participants in a session with `total` participants of
/// which `owners` are privileged.
pub fn non_owner_count(total: u32, owners: u32) -> u32 {
    total.saturating_sub(owners)
}

/// State guarded by the controller lock.
struct ControllerState {
    /// Session id → non-owner participant count.
    occupancy: HashMap<String, u32>,
    /// Join timestamps, oldest first.
    joins: VecDeque<Instant>,
    smoothed: f64,
    last_committed: i32,
    last_change_at: Instant,
    cooldown_until: Option<Instant>,
    /// Number of commits so far.
    commit_seq: u64,
}

impl ControllerState {
    fn trim_joins(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.joins.front() {
            if now.saturating_duration_since(oldest) > window {
                self.joins.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Owns occupancy state and decides the host rate.
pub struct RateController {
    tuning: Tuning,
    sink: Arc<dyn RateSink>,
    statistics: Arc<StatisticsTracker>,
    state: Mutex<ControllerState>,
    /// Highest commit sequence whose sample reached the statistics.
    published_seq: AtomicU64,
    on_change: Option<ChangeCallback>,
}

impl RateController {
    /// Create a controller and apply `min_rate` to the host as the
    /// starting rate.
    pub fn new(
        tuning: Tuning,
        sink: Arc<dyn RateSink>,
        statistics: Arc<StatisticsTracker>,
    ) -> Self {
        Self::new_at(tuning, sink, statistics, Instant::now())
    }

    pub fn new_at(
        tuning: Tuning,
        sink: Arc<dyn RateSink>,
        statistics: Arc<StatisticsTracker>,
        now: Instant,
    ) -> Self {
        let initial = tuning.min_rate;
        sink.apply_rate(initial);
        statistics.record_applied_at(initial, now);
        statistics.update_extreme_tracking_at(initial, tuning.min_rate, tuning.max_rate, now);
        info!(
            rate = initial,
            min = tuning.min_rate,
            max = tuning.max_rate,
            "rate controller initialized"
        );

        Self {
            tuning,
            sink,
            statistics,
            state: Mutex::new(ControllerState {
                occupancy: HashMap::new(),
                joins: VecDeque::new(),
                smoothed: initial as f64,
                last_committed: initial,
                last_change_at: now,
                cooldown_until: None,
                commit_seq: 0,
            }),
            published_seq: AtomicU64::new(0),
            on_change: None,
        }
    }

    /// Set a callback for committed rate changes.
    pub fn with_callback(mut self, callback: ChangeCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// The active tuning.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn statistics(&self) -> &Arc<StatisticsTracker> {
        &self.statistics
    }

    /// The last rate written to the host.
    pub fn current_rate(&self) -> i32 {
        self.state().last_committed
    }

    pub fn occupancy(&self) -> Occupancy {
        let state = self.state();
        let threshold = i64::from(self.tuning.active_session_threshold);
        Occupancy {
            sessions: state.occupancy.len(),
            active_sessions: state
                .occupancy
                .values()
                .filter(|&&n| i64::from(n) >= threshold)
                .count(),
            participants: state.occupancy.values().map(|&n| u64::from(n)).sum(),
        }
    }

    /// A session became known with `participants` non-owner participants.
    ///
    /// A session that is already tracked keeps its count and triggers no
    /// recompute.
    pub fn session_added(&self, id: &str, participants: u32) -> RateDecision {
        self.session_added_at(id, participants, Instant::now())
    }

    pub fn session_added_at(&self, id: &str, participants: u32, now: Instant) -> RateDecision {
        self.handle(now, |state| {
            if state.occupancy.contains_key(id) {
                return false;
            }
            state.occupancy.insert(id.to_string(), participants);
            debug!(session = %id, participants, "session added");
            true
        })
    }

    /// A session ended. Unknown sessions trigger no recompute.
    pub fn session_removed(&self, id: &str) -> RateDecision {
        self.session_removed_at(id, Instant::now())
    }

    pub fn session_removed_at(&self, id: &str, now: Instant) -> RateDecision {
        self.handle(now, |state| {
            let removed = state.occupancy.remove(id).is_some();
            if removed {
                debug!(session = %id, "session removed");
            }
            removed
        })
    }

    /// A non-owner participant joined `id`. Unknown sessions start at 0.
    pub fn participant_joined(&self, id: &str) -> RateDecision {
        self.participant_joined_at(id, Instant::now())
    }

    pub fn participant_joined_at(&self, id: &str, now: Instant) -> RateDecision {
        let window = Duration::from_secs(self.tuning.join_window_secs());
        self.handle(now, |state| {
            let count = state.occupancy.entry(id.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            state.joins.push_back(now);
            state.trim_joins(now, window);
            true
        })
    }

    /// A non-owner participant left `id`. Counts never go below 0.
    pub fn participant_left(&self, id: &str) -> RateDecision {
        self.participant_left_at(id, Instant::now())
    }

    pub fn participant_left_at(&self, id: &str, now: Instant) -> RateDecision {
        self.handle(now, |state| {
            let count = state.occupancy.entry(id.to_string()).or_insert(0);
            *count = count.saturating_sub(1);
            true
        })
    }

    /// Apply `mutate` and, if it changed anything, recompute under the
    /// same lock. Publishing happens after the lock is dropped.
    fn handle<F>(&self, now: Instant, mutate: F) -> RateDecision
    where
        F: FnOnce(&mut ControllerState) -> bool,
    {
        let (decision, seq) = {
            let mut state = self.state();
            if !mutate(&mut *state) {
                return RateDecision::Unchanged;
            }
            let decision = self.recompute(&mut *state, now);
            (decision, state.commit_seq)
        };

        if let RateDecision::Applied(change) = &decision {
            self.publish(change, seq);
        }
        decision
    }

    fn recompute(&self, state: &mut ControllerState, now: Instant) -> RateDecision {
        let t = &self.tuning;

        state.trim_joins(now, Duration::from_secs(t.join_window_secs()));
        let joins_per_minute = t.joins_per_minute(state.joins.len());

        let threshold = i64::from(t.active_session_threshold);
        let mut active: Vec<u32> = state
            .occupancy
            .values()
            .copied()
            .filter(|&n| i64::from(n) >= threshold)
            .collect();

        let min_rate = t.min_rate as f64;
        let (candidate, raw) = if active.is_empty() {
            if t.instant_idle_drop {
                // Sync the EMA so the next active recompute starts from the floor.
                state.smoothed = min_rate;
                (t.min_rate, min_rate)
            } else {
                state.smoothed = ema(t.ema_alpha, min_rate, state.smoothed);
                (round_rate(t.clamp_rate(state.smoothed)), min_rate)
            }
        } else {
            active.sort_unstable_by(|a, b| b.cmp(a));
            let load = LoadBreakdown::compute(t, &active, joins_per_minute);
            state.smoothed = ema(t.ema_alpha, load.raw, state.smoothed);
            // An ema_alpha outside [0, 1] can overshoot the bounds.
            (round_rate(t.clamp_rate(state.smoothed)), load.raw)
        };

        if state.cooldown_until.is_some_and(|until| now < until) {
            debug!(candidate, current = state.last_committed, "rate held: cooldown");
            return RateDecision::Held(HoldReason::Cooldown);
        }

        let delta = i64::from(candidate) - i64::from(state.last_committed);
        let since_last = now.saturating_duration_since(state.last_change_at);
        if delta.abs() < i64::from(t.hysteresis_ticks)
            && since_last < secs(t.min_change_interval_seconds)
        {
            debug!(candidate, current = state.last_committed, "rate held: hysteresis");
            return RateDecision::Held(HoldReason::Hysteresis);
        }

        let previous = state.last_committed;
        state.last_committed = candidate;
        state.last_change_at = now;
        state.commit_seq += 1;
        self.sink.apply_rate(candidate);

        if delta.abs() >= i64::from(t.big_jump_threshold) {
            let cooldown = secs(t.big_jump_cooldown_seconds);
            state.cooldown_until = Some(now + cooldown);
            debug!(delta, cooldown_secs = cooldown.as_secs(), "big jump: cooldown started");
        }

        RateDecision::Applied(RateChange {
            rate: candidate,
            previous,
            raw,
            smoothed: state.smoothed,
            active_sessions: active.len(),
            joins_per_minute,
            idle: active.is_empty(),
            at: now,
        })
    }

    /// Feed a commit to statistics, the log and the callback.
    ///
    /// A commit overtaken by a newer one still counts as a change and still
    /// reaches the callback, but its sample is dropped.
    fn publish(&self, change: &RateChange, seq: u64) {
        let t = &self.tuning;
        let newest = self.published_seq.fetch_max(seq, Ordering::AcqRel) < seq;
        if newest {
            self.statistics.record_applied_at(change.rate, change.at);
            self.statistics
                .update_extreme_tracking_at(change.rate, t.min_rate, t.max_rate, change.at);
        } else {
            debug!(rate = change.rate, seq, "stale commit: sample skipped");
        }

        if change.delta() == 0 {
            return;
        }
        self.statistics.record_change();

        if t.log_on_change {
            if change.idle {
                info!(rate = change.rate, previous = change.previous, "rate applied (idle)");
            } else {
                info!(
                    rate = change.rate,
                    previous = change.previous,
                    raw = format_args!("{:.1}", change.raw),
                    smoothed = format_args!("{:.1}", change.smoothed),
                    active_sessions = change.active_sessions,
                    joins_per_minute = format_args!("{:.2}", change.joins_per_minute),
                    "rate applied"
                );
            }
        }

        if let Some(ref cb) = self.on_change {
            cb(change);
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        // Every mutation leaves the state consistent, so a poisoned lock
        // is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ema(alpha: f64, input: f64, previous: f64) -> f64 {
    alpha * input + (1.0 - alpha) * previous
}

/// Round half to even, saturating at the `i32` range (NaN becomes 0).
fn round_rate(value: f64) -> i32 {
    value.round_ties_even() as i32
}

fn secs(value: i32) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}
