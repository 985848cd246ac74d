//! Log output for the redirector
//!
//! The `[logging]` table picks the level of the crate's own events and the
//! output format. Events from dependencies stay at `warn` unless `RUST_LOG`
//! says otherwise; when `RUST_LOG` is set it replaces the table's level
//! completely.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Target prefix of every event this crate emits
const TARGET: &str = "iecloop";

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-field human readable lines
    #[default]
    Pretty,
    /// One short line per event
    Compact,
    /// One JSON object per line
    Json,
}

/// `[logging]` table of config.toml
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// The configured level, or `None` if it is not a level name.
    pub fn level(&self) -> Option<Level> {
        Level::from_str(self.level.trim()).ok()
    }

    /// Filter used when `RUST_LOG` is unset: dependencies at `warn`, this
    /// crate at the configured level (`info` if it does not parse).
    pub fn filter_directive(&self) -> String {
        let level = self.level().unwrap_or(Level::INFO);
        format!("warn,{}={}", TARGET, level.as_str().to_lowercase())
    }
}

/// Installs the global subscriber.
///
/// Only the first call has an effect; later calls leave the installed
/// subscriber in place.
pub fn init_logging(config: Option<&LogConfig>) {
    let defaults = LogConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.filter_directive()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_ids(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_thread_ids(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if installed.is_ok() && config.level().is_none() {
        tracing::warn!("unknown log level {:?}, using info", config.level);
    }
}
