//! Host lifecycle events read as JSON lines.
//!
//! ```text
//! {"at_ms": 0,    "event": "session_added", "session": "room-1", "participants": 3}
//! {"at_ms": 1200, "event": "participant_joined", "session": "room-1"}
//! {"at_ms": 9000, "event": "session_removed", "session": "room-1"}
//! ```
//!
//! `at_ms` is an offset from the start of replay.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use tickgrid_controller::{RateController, RateDecision};

/// One line of the event stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventLine {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: HostEvent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    SessionAdded {
        session: String,
        #[serde(default)]
        participants: u32,
    },
    SessionRemoved {
        session: String,
    },
    ParticipantJoined {
        session: String,
    },
    ParticipantLeft {
        session: String,
    },
}

impl HostEvent {
    /// Deliver the event to the controller.
    pub fn apply(&self, controller: &RateController) -> RateDecision {
        match self {
            HostEvent::SessionAdded {
                session,
                participants,
            } => controller.session_added(session, *participants),
            HostEvent::SessionRemoved { session } => controller.session_removed(session),
            HostEvent::ParticipantJoined { session } => controller.participant_joined(session),
            HostEvent::ParticipantLeft { session } => controller.participant_left(session),
        }
    }
}

/// Counts from one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub delivered: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<EventLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Read events until end of input, delivering each one at its offset.
///
/// Malformed lines are logged and skipped. Offsets that are already in
/// the past are delivered immediately.
pub async fn replay<R>(reader: R, controller: &RateController) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let start = tokio::time::Instant::now();
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let parsed = match parse_line(&line) {
            None => continue,
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                warn!(line = line_no, error = %e, "skipping malformed event");
                stats.skipped += 1;
                continue;
            }
        };

        tokio::time::sleep_until(start + Duration::from_millis(parsed.at_ms)).await;

        let decision = parsed.event.apply(controller);
        stats.delivered += 1;
        if decision.applied().is_some() {
            stats.applied += 1;
        }
        debug!(line = line_no, event = ?parsed.event, ?decision, "event delivered");
    }

    Ok(stats)
}
