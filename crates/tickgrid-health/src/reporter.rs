//! Reporter — background timers for health checks and status summaries.
//!
//! Both timers run in one task and only read from the controller; the
//! statistics tracker is the only thing they write to.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use tickgrid_controller::{Occupancy, RateController};
use tickgrid_stats::StatisticsSnapshot;

use crate::checker::{HealthChecker, HealthWarning};

/// Shortest timer period `run` accepts.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Periodic status report: statistics plus current occupancy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    #[serde(flatten)]
    pub statistics: StatisticsSnapshot,
    pub sessions: usize,
    pub active_sessions: usize,
    pub participants: u64,
}

impl StatusSummary {
    pub fn new(statistics: StatisticsSnapshot, occupancy: Occupancy) -> Self {
        Self {
            statistics,
            sessions: occupancy.sessions,
            active_sessions: occupancy.active_sessions,
            participants: occupancy.participants,
        }
    }
}

/// Drives the health check and summary timers for one controller.
pub struct Reporter {
    controller: Arc<RateController>,
    checker: HealthChecker,
}

impl Reporter {
    pub fn new(controller: Arc<RateController>) -> Self {
        Self {
            controller,
            checker: HealthChecker::new(),
        }
    }

    /// Sample the current rate and run the health checks.
    pub fn health_tick(&mut self, now: Instant) -> Vec<HealthWarning> {
        let tuning = self.controller.tuning();
        let stats = self.controller.statistics();
        let rate = self.controller.current_rate();

        stats.record_applied_at(rate, now);
        stats.update_extreme_tracking_at(rate, tuning.min_rate, tuning.max_rate, now);
        let snapshot = stats.snapshot_at(now);

        let warnings = self.checker.check(rate, tuning, &snapshot, now);
        for w in &warnings {
            warn!(rate, "{w}");
        }
        warnings
    }

    /// Build and log a status summary, then start a new statistics window.
    pub fn summary_tick(&self, now: Instant) -> StatusSummary {
        let stats = self.controller.statistics();
        let summary = StatusSummary::new(stats.snapshot_at(now), self.controller.occupancy());
        let s = &summary.statistics;

        info!(
            rate = s.current_rate,
            average = format_args!("{:.1}", s.average_rate),
            samples = s.history_size,
            peak = s.peak_rate,
            min = s.min_rate,
            active_sessions = summary.active_sessions,
            participants = summary.participants,
            changes_per_hour = format_args!("{:.1}", s.changes_per_hour),
            "status summary"
        );
        if s.secs_since_max > 60.0 {
            warn!(
                minutes = format_args!("{:.1}", s.secs_since_max / 60.0),
                "time since rate was last at maximum"
            );
        }

        stats.reset_window_at(now);
        summary
    }

    /// Run both timers until the shutdown signal fires.
    ///
    /// The first tick of each timer fires one full interval after start.
    /// Periods shorter than one millisecond are raised to one millisecond.
    pub async fn run(
        &mut self,
        health_interval: Duration,
        summary_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let health_interval = health_interval.max(MIN_PERIOD);
        let summary_interval = summary_interval.max(MIN_PERIOD);
        info!(
            health_secs = health_interval.as_secs(),
            summary_secs = summary_interval.as_secs(),
            "reporter started"
        );

        let start = tokio::time::Instant::now();
        let mut health = tokio::time::interval_at(start + health_interval, health_interval);
        let mut summary = tokio::time::interval_at(start + summary_interval, summary_interval);

        loop {
            tokio::select! {
                _ = health.tick() => {
                    self.health_tick(Instant::now());
                }
                _ = summary.tick() => {
                    self.summary_tick(Instant::now());
                }
                _ = shutdown.changed() => {
                    info!("reporter shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickgrid_controller::SharedRate;
    use tickgrid_stats::StatisticsTracker;
    use tickgrid_tuning::Tuning;

    fn controller(now: Instant) -> Arc<RateController> {
        let tuning = Tuning {
            min_rate: 30,
            max_rate: 90,
            ema_alpha: 1.0,
            log_on_change: false,
            ..Tuning::default()
        };
        Arc::new(RateController::new_at(
            tuning,
            Arc::new(SharedRate::new(0)),
            Arc::new(StatisticsTracker::new()),
            now,
        ))
    }

    #[test]
    fn health_tick_records_a_sample() {
        let t0 = Instant::now();
        let controller = controller(t0);
        let mut reporter = Reporter::new(controller.clone());

        let before = controller.statistics().snapshot_at(t0).sample_count;
        let warnings = reporter.health_tick(t0 + Duration::from_secs(120));
        assert!(warnings.is_empty());

        let snap = controller.statistics().snapshot_at(t0 + Duration::from_secs(120));
        assert_eq!(snap.sample_count, before + 1);
        assert_eq!(snap.current_rate, 30);
        // Touching the floor refreshes the min marker.
        assert_eq!(snap.secs_since_min, 0.0);
    }

    #[test]
    fn health_tick_warns_when_pinned() {
        let t0 = Instant::now();
        let controller = controller(t0);
        controller.session_added_at("packed", 200, t0);
        assert_eq!(controller.current_rate(), 90);

        let mut reporter = Reporter::new(controller);
        let warnings = reporter.health_tick(t0 + Duration::from_secs(120));
        assert!(matches!(
            warnings.as_slice(),
            [HealthWarning::PinnedAtMax { max_rate: 90, .. }]
        ));
    }

    #[test]
    fn summary_includes_occupancy_and_resets_window() {
        let t0 = Instant::now();
        let controller = controller(t0);
        controller.session_added_at("room-1", 5, t0);
        controller.session_added_at("room-2", 0, t0);

        let reporter = Reporter::new(controller.clone());
        let summary = reporter.summary_tick(t0 + Duration::from_secs(300));
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.active_sessions, 1);
        assert_eq!(summary.participants, 5);
        assert!(summary.statistics.changes_per_hour > 0.0);

        let after = controller.statistics().snapshot_at(t0 + Duration::from_secs(360));
        assert_eq!(after.changes_per_hour, 0.0);
    }

    #[test]
    fn summary_serializes_flat() {
        let t0 = Instant::now();
        let reporter = Reporter::new(controller(t0));
        let summary = reporter.summary_tick(t0);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["current_rate"], 30);
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let controller = controller(Instant::now());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut reporter = Reporter::new(controller.clone());
        let handle = tokio::spawn(async move {
            reporter
                .run(
                    Duration::from_secs(120),
                    Duration::from_secs(300),
                    shutdown_rx,
                )
                .await;
        });

        // Paused time auto-advances through four health ticks.
        tokio::time::sleep(Duration::from_secs(490)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Initial sample plus one per health tick.
        assert_eq!(controller.statistics().snapshot().sample_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_zero_intervals() {
        let controller = controller(Instant::now());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut reporter = Reporter::new(controller.clone());
        let handle = tokio::spawn(async move {
            reporter
                .run(Duration::ZERO, Duration::ZERO, shutdown_rx)
                .await;
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.expect("reporter task should not panic");

        assert!(controller.statistics().snapshot().sample_count > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_configured_interval_runs_at_default() {
        let config = tickgrid_tuning::TickgridConfig::from_toml_str(
            "[reporting]\nhealth_interval = \"0s\"\n",
        )
        .unwrap();
        let health = config.reporting.health_interval();
        assert_eq!(health, Duration::from_secs(120));

        let controller = controller(Instant::now());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut reporter = Reporter::new(controller.clone());
        let summary = config.reporting.summary_interval();
        let handle = tokio::spawn(async move {
            reporter.run(health, summary, shutdown_rx).await;
        });

        tokio::time::sleep(Duration::from_secs(130)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.expect("reporter task should not panic");

        assert_eq!(controller.statistics().snapshot().sample_count, 2);
    }
}
