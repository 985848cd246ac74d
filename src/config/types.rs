//! Configuration types

use crate::capture::PortConf;
use crate::dataplane::{EngineSettings, Mode, DEFAULT_BURST_SIZE};
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User-defined configuration (config.toml)
///
/// Every table and field has a default, so an empty file is a valid
/// loopback configuration with no ports.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: Mode,
    pub ports: Vec<PortConfig>,
    pub cycle: CycleConfig,
    pub pool: PoolConfig,
    pub runtime: RuntimeConfig,
    pub logging: LogConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortConfig {
    /// Interface name, e.g. "eth0"
    pub name: String,
    #[serde(default = "default_ring")]
    pub rx_ring: usize,
    #[serde(default = "default_ring")]
    pub tx_ring: usize,
}

fn default_ring() -> usize {
    PortConf::default().rx_ring
}

impl PortConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rx_ring: default_ring(),
            tx_ring: default_ring(),
        }
    }

    pub fn port_conf(&self) -> PortConf {
        PortConf {
            rx_ring: self.rx_ring,
            tx_ring: self.tx_ring,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// Polling period in microseconds
    pub period_us: u64,
    /// Maximum frames taken per port per cycle
    pub burst_size: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_us: 300,
            burst_size: DEFAULT_BURST_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of frame buffers
    pub capacity: usize,
    /// Bytes per buffer
    pub buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 8191,
            buffer_size: 2048,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Cores available to the process; the first one polls
    pub cores: Vec<usize>,
    /// mlockall() before polling
    pub lock_memory: bool,
    /// SCHED_FIFO priority, 0 leaves the policy alone
    pub realtime_priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Milliseconds between stats lines in the log, 0 disables
    pub stats_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 1000,
        }
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            mode: self.mode,
            period: Duration::from_micros(self.cycle.period_us),
            burst_size: self.cycle.burst_size,
            stats_interval: Duration::from_millis(self.telemetry.stats_interval_ms),
        }
    }
}
