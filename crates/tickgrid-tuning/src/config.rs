//! tickgrid.toml configuration parser, plus the legacy JSON key/value
//! format (`{"values": {"MinTickRate": 30, ...}}`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{ConfigError, ConfigResult, Tuning};

const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(120);
const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickgridConfig {
    /// When false the daemon exits without touching the host rate.
    pub enabled: bool,
    pub tuning: Tuning,
    pub reporting: ReportingConfig,
}

impl Default for TickgridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tuning: Tuning::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

/// Cadence of the periodic health check and status summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub health_interval: String,
    pub summary_interval: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            health_interval: "2m".to_string(),
            summary_interval: "5m".to_string(),
        }
    }
}

impl ReportingConfig {
    /// Health check period. Zero or unparseable values use the default.
    pub fn health_interval(&self) -> Duration {
        parse_period(&self.health_interval, DEFAULT_HEALTH_INTERVAL)
    }

    /// Status summary period. Zero or unparseable values use the default.
    pub fn summary_interval(&self) -> Duration {
        parse_period(&self.summary_interval, DEFAULT_SUMMARY_INTERVAL)
    }
}

/// Like [`parse_duration`], but a timer period must be non-zero.
fn parse_period(s: &str, default: Duration) -> Duration {
    match parse_duration(s, default) {
        d if d.is_zero() => default,
        d => d,
    }
}

impl TickgridConfig {
    /// Load a config file. `.json` files use the legacy key/value
    /// layout; anything else is parsed as TOML.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_legacy_json(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        debug!(path = %path.display(), json = is_json, "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse the legacy JSON layout.
    ///
    /// Each key is read only when present with the expected JSON type;
    /// anything else keeps its default.
    pub fn from_legacy_json(content: &str) -> ConfigResult<Self> {
        let doc: Value = serde_json::from_str(content)?;
        let values = doc
            .get("values")
            .and_then(Value::as_object)
            .ok_or(ConfigError::MissingValues)?;

        let mut config = Self::default();
        read_bool(values, "Enable", &mut config.enabled);

        let t = &mut config.tuning;
        read_int(values, "MinTickRate", &mut t.min_rate);
        read_int(values, "MaxTickRate", &mut t.max_rate);

        read_float(values, "AddedTicksPerUser", &mut t.added_per_participant);
        read_float(values, "AddedTicksPerWorld", &mut t.added_per_extra_active_session);

        read_int(values, "ActiveWorldUserThreshold", &mut t.active_session_threshold);

        read_int(values, "TopKWorlds", &mut t.top_k_sessions);
        read_float(values, "BusyWorldWeight", &mut t.busy_session_weight);
        read_int(values, "PerWorldUserSoftCap", &mut t.per_session_soft_cap);
        read_float(values, "PerWorldDiminish", &mut t.soft_cap_diminish);

        read_float(values, "JoinRateTicksPerJpm", &mut t.join_rate_ticks_per_jpm);
        read_int(values, "JoinWindowSeconds", &mut t.join_window_seconds);
        read_float(values, "JoinRateMaxBonusTicks", &mut t.join_rate_max_bonus);

        read_float(values, "EmaAlpha", &mut t.ema_alpha);
        read_int(values, "HysteresisTicks", &mut t.hysteresis_ticks);
        read_int(values, "MinChangeIntervalSeconds", &mut t.min_change_interval_seconds);
        read_int(values, "BigJumpThreshold", &mut t.big_jump_threshold);
        read_int(values, "BigJumpCooldownSeconds", &mut t.big_jump_cooldown_seconds);

        read_bool(values, "LogOnChange", &mut t.log_on_change);
        read_bool(values, "InstantIdleDrop", &mut t.instant_idle_drop);

        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

fn read_int(values: &Map<String, Value>, key: &str, dst: &mut i32) {
    if let Some(x) = values
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
    {
        *dst = x;
    }
}

fn read_float(values: &Map<String, Value>, key: &str, dst: &mut f64) {
    if let Some(x) = values.get(key).and_then(Value::as_f64) {
        *dst = x;
    }
}

fn read_bool(values: &Map<String, Value>, key: &str, dst: &mut bool) {
    if let Some(x) = values.get(key).and_then(Value::as_bool) {
        *dst = x;
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h".
///
/// A bare number is taken as seconds. Unparseable input yields `default`.
pub fn parse_duration(s: &str, default: Duration) -> Duration {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.unwrap_or(default)
}
