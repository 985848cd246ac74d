//! Counters for frame disposition and cycle timing.
//!
//! Counters are relaxed atomics so the polling thread can bump them while
//! another thread exports a summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-port frame statistics.
#[derive(Debug, Default)]
pub struct PortStats {
    /// Frames returned by receive bursts.
    pub rx_frames: Counter,
    /// Bytes returned by receive bursts.
    pub rx_bytes: Counter,
    /// Redirected frames accepted by this port's transmit path.
    pub tx_frames: Counter,
    /// Bytes accepted by this port's transmit path.
    pub tx_bytes: Counter,
    /// Redirected frames this port refused (backpressure).
    pub tx_rejected: Counter,
    /// Frames received here that were neither SV nor GOOSE.
    pub ignored: Counter,
    /// SV/GOOSE frames too short to carry the APPID pair.
    pub malformed: Counter,
    /// Receive attempts cut short by an empty frame pool.
    pub rx_nobuf: Counter,
    /// Frames dropped on receive for not fitting a pool buffer.
    pub rx_oversize: Counter,
}

impl PortStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Engine-wide cycle statistics.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Completed polling cycles.
    pub cycles: Counter,
    /// Cycles whose next deadline had already passed when it was computed.
    pub overruns: Counter,
}

/// Registry of everything one engine instance counts.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    ports: RwLock<Vec<(String, Arc<PortStats>)>>,
    pub engine: EngineStats,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a port and returns the handle the hot path updates.
    ///
    /// Registering the same name twice returns the existing statistics.
    pub fn register_port(&self, name: &str) -> Arc<PortStats> {
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, stats)) = ports.iter().find(|(n, _)| n == name) {
            return Arc::clone(stats);
        }
        let stats = Arc::new(PortStats::new());
        ports.push((name.to_string(), Arc::clone(&stats)));
        stats
    }

    pub fn port(&self, name: &str) -> Option<Arc<PortStats>> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| Arc::clone(s))
    }

    /// Exports all metrics as key-value pairs, ports in registration order.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("cycles".into(), self.engine.cycles.get()),
            ("overruns".into(), self.engine.overruns.get()),
        ];

        let ports = self.ports.read().unwrap_or_else(PoisonError::into_inner);
        for (name, stats) in ports.iter() {
            result.extend([
                (format!("{}_rx_frames", name), stats.rx_frames.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_frames", name), stats.tx_frames.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_tx_rejected", name), stats.tx_rejected.get()),
                (format!("{}_ignored", name), stats.ignored.get()),
                (format!("{}_malformed", name), stats.malformed.get()),
                (format!("{}_rx_nobuf", name), stats.rx_nobuf.get()),
                (format!("{}_rx_oversize", name), stats.rx_oversize.get()),
            ]);
        }

        result
    }

    /// One-line summary for periodic logging.
    pub fn summary(&self) -> String {
        self.export()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
