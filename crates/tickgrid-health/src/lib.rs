//! tickgrid-health — periodic health checks and status summaries.
//!
//! Two independent timers read the controller and its statistics; neither
//! influences control decisions.
//!
//! # Architecture
//!
//! ```text
//! Reporter::run()
//!   ├── health tick (default 2m)
//!   │   ├── record current rate into StatisticsTracker
//!   │   └── HealthChecker::check() → Vec<HealthWarning>
//!   └── summary tick (default 5m)
//!       ├── StatusSummary (snapshot + occupancy)
//!       └── StatisticsTracker::reset_window()
//! ```
//!
//! Warnings are rate-limited: pinned-at-max at most every 5 minutes,
//! high fluctuation at most every 10, and a stuck rate after six
//! identical checks above the floor.

pub mod checker;
pub mod reporter;

pub use checker::{HealthChecker, HealthWarning};
pub use reporter::{Reporter, StatusSummary};
