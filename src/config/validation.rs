//! Configuration validation

use super::Config;
use crate::dataplane::Mode;
use crate::protocol::ethernet::MAX_FRAME_SIZE;
use std::collections::HashSet;

/// Largest burst a port is asked for in one receive call
pub const MAX_BURST_SIZE: usize = 512;
/// Shortest period that still leaves the kernel time to deliver frames
const MIN_SENSIBLE_PERIOD_US: u64 = 50;
/// Smallest buffer that holds a minimum-size Ethernet frame
const MIN_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_ports(config, &mut result);
    validate_cycle(config, &mut result);
    validate_pool(config, &mut result);
    validate_runtime(config, &mut result);

    if config.logging.level().is_none() {
        result.warn(format!(
            "logging.level: unknown level {:?}, info is used",
            config.logging.level
        ));
    }

    result
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    if config.ports.is_empty() {
        result.error("ports: at least one port is required");
        return;
    }

    let mut seen = HashSet::new();
    for (index, port) in config.ports.iter().enumerate() {
        if port.name.is_empty() {
            result.error(format!("ports[{}]: name must not be empty", index));
        } else if !seen.insert(port.name.as_str()) {
            result.error(format!("ports[{}]: duplicate port {}", index, port.name));
        }
        if port.rx_ring == 0 || port.tx_ring == 0 {
            result.error(format!(
                "ports[{}]: rx_ring and tx_ring must be non-zero",
                index
            ));
        }
    }

    match config.mode {
        Mode::Forwarding if config.ports.len() % 2 != 0 => {
            result.error(format!(
                "mode: forwarding pairs ports 0-1, 2-3, ... and needs an even count, got {}",
                config.ports.len()
            ));
        }
        Mode::Loopback if config.ports.len() > 1 => {
            result.warn(format!(
                "mode: loopback with {} ports, each port is looped back to itself",
                config.ports.len()
            ));
        }
        _ => {}
    }
}

fn validate_cycle(config: &Config, result: &mut ValidationResult) {
    let cycle = &config.cycle;
    if cycle.period_us == 0 {
        result.error("cycle.period_us: must be greater than 0");
    } else if cycle.period_us < MIN_SENSIBLE_PERIOD_US {
        result.warn(format!(
            "cycle.period_us: {}us is very short, expect overruns",
            cycle.period_us
        ));
    }

    if cycle.burst_size == 0 || cycle.burst_size > MAX_BURST_SIZE {
        result.error(format!(
            "cycle.burst_size: must be between 1 and {}, got {}",
            MAX_BURST_SIZE, cycle.burst_size
        ));
    }
}

fn validate_pool(config: &Config, result: &mut ValidationResult) {
    let pool = &config.pool;
    if pool.capacity == 0 {
        result.error("pool.capacity: must be greater than 0");
        return;
    }
    if pool.buffer_size < MIN_BUFFER_SIZE {
        result.error(format!(
            "pool.buffer_size: must be at least {} bytes, got {}",
            MIN_BUFFER_SIZE, pool.buffer_size
        ));
    } else if pool.buffer_size < MAX_FRAME_SIZE {
        result.warn(format!(
            "pool.buffer_size: {} bytes is below the {} byte Ethernet maximum, longer frames are dropped",
            pool.buffer_size, MAX_FRAME_SIZE
        ));
    }

    let wanted: usize = config.ports.iter().map(|p| p.rx_ring).sum::<usize>()
        + config.cycle.burst_size;
    if pool.capacity < wanted {
        result.warn(format!(
            "pool.capacity: {} buffers is less than the {} the RX rings and one burst can hold",
            pool.capacity, wanted
        ));
    }
}

fn validate_runtime(config: &Config, result: &mut ValidationResult) {
    let runtime = &config.runtime;
    if runtime.realtime_priority > 99 {
        result.error(format!(
            "runtime.realtime_priority: must be 0-99, got {}",
            runtime.realtime_priority
        ));
    }
    if runtime.cores.len() > 1 {
        result.warn(format!(
            "runtime.cores: {} cores listed, only core {} polls",
            runtime.cores.len(),
            runtime.cores[0]
        ));
    }
}
