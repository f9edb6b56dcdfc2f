//! tickgrid-stats — observability for the rate controller.
//!
//! Records every applied rate into a bounded rolling window and derives
//! summary metrics on demand. Purely advisory: nothing here feeds back
//! into control decisions.
//!
//! # Architecture
//!
//! ```text
//! StatisticsTracker
//!   ├── record_applied()            ← controller commit, health tick
//!   ├── record_change()             ← controller commit
//!   ├── update_extreme_tracking()   ← controller commit, health tick
//!   ├── snapshot() → StatisticsSnapshot
//!   └── reset_window()              ← after each periodic summary
//! ```

pub mod tracker;

pub use tracker::{StatisticsSnapshot, StatisticsTracker, DEFAULT_HISTORY_CAPACITY};
