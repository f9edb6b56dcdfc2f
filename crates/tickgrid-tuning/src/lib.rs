//! tickgrid-tuning — the knobs that shape the rate controller.
//!
//! A [`Tuning`] is built once at startup (from defaults, a `tickgrid.toml`
//! file, or a legacy JSON key/value file) and handed to the controller by
//! value. [`validate`] inspects it and reports suspicious settings as data;
//! it never rejects a configuration.
//!
//! # Config file
//!
//! ```toml
//! enabled = true
//!
//! [tuning]
//! min_rate = 30
//! max_rate = 144
//! ema_alpha = 0.22
//!
//! [reporting]
//! health_interval = "2m"
//! summary_interval = "5m"
//! ```

pub mod config;
pub mod error;
pub mod tuning;
pub mod validate;

pub use config::{parse_duration, ReportingConfig, TickgridConfig};
pub use error::{ConfigError, ConfigResult};
pub use tuning::Tuning;
pub use validate::{validate, ValidationIssue};
