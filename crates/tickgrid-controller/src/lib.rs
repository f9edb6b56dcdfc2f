//! tickgrid-controller — occupancy-driven rate control.
//!
//! Host lifecycle events (session added/removed, participant
//! joined/left) update the controller's occupancy map and join history,
//! then re-run the decision algorithm synchronously under one lock. A
//! committed decision is written to the injected [`RateSink`] and recorded
//! into the shared `StatisticsTracker`.
//!
//! # Decision Algorithm
//!
//! ```text
//! active = sessions with participants >= active_session_threshold
//!
//! if active is empty:
//!     instant_idle_drop: candidate = min_rate, smoothed = min_rate
//!     otherwise:         smoothed  = ema(min_rate), candidate = round(clamp(smoothed))
//! else:
//!     sort active busiest first
//!     busy_load  = Σ weight(i) * (min(n, cap) + max(0, n - cap) * diminish)
//!     raw        = clamp(min_rate + busy_load * per_participant
//!                        + (active - 1) * per_extra_session
//!                        + min(jpm * ticks_per_jpm, max_bonus))
//!     smoothed   = ema(raw), candidate = round(clamp(smoothed))
//!
//! commit if not cooling down and
//!     |candidate - last| >= hysteresis_ticks or since_last >= min_change_interval
//! a commit with |delta| >= big_jump_threshold starts a cooldown
//! ```

pub mod controller;
pub mod load;
pub mod sink;

pub use controller::{
    non_owner_count, ChangeCallback, HoldReason, Occupancy, RateChange, RateController,
    RateDecision,
};
pub use load::LoadBreakdown;
pub use sink::{RateSink, SharedRate};
