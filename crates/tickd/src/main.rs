//! tickd — the tickgrid daemon.
//!
//! Assembles the tickgrid subsystems around a single host rate slot:
//! - Tuning (config file + validation)
//! - Statistics tracker
//! - Rate controller
//! - Health reporter (health checks + status summaries)
//!
//! Host lifecycle events arrive as JSON lines on a file or stdin.
//!
//! # Usage
//!
//! ```text
//! tickd validate --config tickgrid.toml
//! tickd run --config tickgrid.toml --events events.jsonl
//! ```

mod events;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tickgrid_controller::{RateController, SharedRate};
use tickgrid_health::Reporter;
use tickgrid_stats::StatisticsTracker;
use tickgrid_tuning::{TickgridConfig, Tuning};

#[derive(Parser)]
#[command(name = "tickd", about = "Adaptive tick rate daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a config file and report validation issues.
    Validate {
        /// Path to tickgrid.toml (or a legacy .json config).
        #[arg(short, long, default_value = "tickgrid.toml")]
        config: PathBuf,
    },
    /// Run the controller against a stream of host events.
    Run {
        /// Path to tickgrid.toml (or a legacy .json config).
        #[arg(short, long, default_value = "tickgrid.toml")]
        config: PathBuf,

        /// JSON-lines event file. Reads stdin when omitted.
        #[arg(short, long)]
        events: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
                tracing_subscriber::EnvFilter::try_new("info,tickd=debug,tickgrid=debug")
            })?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { config } => validate(&config),
        Command::Run { config, events } => run(&config, events).await,
    }
}

/// Load the config, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> anyhow::Result<TickgridConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(TickgridConfig::default());
    }
    TickgridConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

fn log_startup_summary(t: &Tuning) {
    info!(
        min = t.min_rate,
        max = t.max_rate,
        per_participant = t.added_per_participant,
        per_extra_session = t.added_per_extra_active_session,
        active_threshold = t.active_session_threshold,
        "tuning: rate bounds and linear load"
    );
    info!(
        top_k = t.top_k_sessions,
        busy_weight = t.busy_session_weight,
        soft_cap = t.per_session_soft_cap,
        diminish = t.soft_cap_diminish,
        "tuning: busy session shaping"
    );
    info!(
        ticks_per_jpm = t.join_rate_ticks_per_jpm,
        max_bonus = t.join_rate_max_bonus,
        window_secs = t.join_window_seconds,
        "tuning: join bursts"
    );
    info!(
        ema_alpha = t.ema_alpha,
        hysteresis = t.hysteresis_ticks,
        min_interval_secs = t.min_change_interval_seconds,
        big_jump = t.big_jump_threshold,
        cooldown_secs = t.big_jump_cooldown_seconds,
        instant_idle_drop = t.instant_idle_drop,
        "tuning: stability"
    );
}

/// Log every validation issue and return how many there were.
fn report_issues(t: &Tuning) -> usize {
    let issues = tickgrid_tuning::validate(t);
    for issue in &issues {
        warn!(field = issue.field, "{}", issue.message);
    }
    issues.len()
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    log_startup_summary(&config.tuning);

    let issues = report_issues(&config.tuning);
    if issues > 0 {
        anyhow::bail!("{issues} validation issue(s) in {}", path.display());
    }
    info!(path = %path.display(), "config is valid");
    Ok(())
}

async fn run(config_path: &Path, events_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if !config.enabled {
        info!("tickgrid disabled via config");
        return Ok(());
    }

    info!("tickgrid daemon starting");

    let issues = report_issues(&config.tuning);
    if issues > 0 {
        warn!(issues, "continuing with invalid tuning");
    }
    log_startup_summary(&config.tuning);

    // ── Initialize subsystems ──────────────────────────────────

    let slot = SharedRate::new(config.tuning.min_rate);
    let statistics = Arc::new(StatisticsTracker::new());
    let controller = Arc::new(RateController::new(
        config.tuning.clone(),
        Arc::new(slot.clone()),
        statistics,
    ));

    let health_interval = config.reporting.health_interval();
    let summary_interval = config.reporting.summary_interval();
    let mut reporter = Reporter::new(controller.clone());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reporter_handle = tokio::spawn(async move {
        reporter
            .run(health_interval, summary_interval, shutdown_rx)
            .await;
    });

    // ── Replay host events ─────────────────────────────────────

    let result = tokio::select! {
        result = replay_events(events_path.as_deref(), &controller) => {
            match &result {
                Ok(stats) => info!(
                    delivered = stats.delivered,
                    applied = stats.applied,
                    skipped = stats.skipped,
                    "end of event input"
                ),
                Err(e) => error!(error = %e, "event replay failed"),
            }
            result.map(|_| ())
        }
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            signal.context("failed to listen for ctrl-c")
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = reporter_handle.await {
        error!(error = %e, "reporter task failed");
    }

    info!(rate = slot.get(), "tickgrid daemon stopped");
    result
}

async fn replay_events(
    path: Option<&Path>,
    controller: &RateController,
) -> anyhow::Result<events::ReplayStats> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open events file {}", path.display()))?;
            info!(path = %path.display(), "replaying events");
            events::replay(BufReader::new(file), controller).await
        }
        None => {
            info!("reading events from stdin");
            events::replay(BufReader::new(tokio::io::stdin()), controller).await
        }
    }
}
