//! Cyclic poll-and-redirect engine
//!
//! Each cycle visits the ports in order. For every port it receives one
//! burst and disposes of each frame before moving on:
//!
//! ```text
//! receive burst ─┬─ SV/GOOSE, long enough ── mutate ── transmit ─┬─ accepted: port owns it
//!                │                                               └─ refused:  release
//!                └─ anything else ──────────────────────────────── release
//! ```
//!
//! No frame outlives the burst it arrived in, and a refused transmit is not
//! retried. The engine then sleeps on its [`CycleScheduler`] until the next
//! absolute deadline.

use super::classifier::{classify, Classification};
use super::mutator::mutate;
use super::scheduler::{Clock, CycleScheduler, MonotonicClock, Wake};
use crate::buffer::Frame;
use crate::capture::Port;
use crate::protocol::ethernet::{HEADER_LEN, MIN_APPID_FRAME_LEN};
use crate::telemetry::{MetricsRegistry, PortStats};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default polling period
pub const DEFAULT_PERIOD: Duration = Duration::from_micros(300);
/// Default receive burst size
pub const DEFAULT_BURST_SIZE: usize = 32;

/// Where a redirected frame leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Back out of the port it arrived on
    #[default]
    Loopback,
    /// Out of the paired port: 0↔1, 2↔3, ...
    Forwarding,
}

impl Mode {
    /// Index of the port a frame received on port `index` is sent from.
    pub fn destination(self, index: usize) -> usize {
        match self {
            Mode::Loopback => index,
            Mode::Forwarding => index ^ 1,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Loopback => write!(f, "loopback"),
            Mode::Forwarding => write!(f, "forwarding"),
        }
    }
}

/// Engine tuning fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub mode: Mode,
    pub period: Duration,
    pub burst_size: usize,
    /// Interval between stats summaries in the log; zero disables them
    pub stats_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Loopback,
            period: DEFAULT_PERIOD,
            burst_size: DEFAULT_BURST_SIZE,
            stats_interval: Duration::ZERO,
        }
    }
}

/// Frame dispositions from one cycle (or the sum of several)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    /// Mutated and accepted by a transmit path
    pub redirected: usize,
    /// Mutated but refused by the transmit path, then released
    pub rejected: usize,
    /// Not SV/GOOSE, released
    pub ignored: usize,
    /// Too short to classify or to carry an APPID pair, released
    pub malformed: usize,
    /// Ports whose receive stopped for lack of buffers
    pub starved_ports: usize,
    /// Dropped by the port for not fitting a buffer; not part of `received`
    pub oversized: usize,
}

impl CycleReport {
    /// Frames released back to the pool by the engine itself.
    pub fn released(&self) -> usize {
        self.rejected + self.ignored + self.malformed
    }

    /// Every received frame was redirected or released.
    pub fn is_balanced(&self) -> bool {
        self.received == self.redirected + self.released()
    }

    fn merge(&mut self, other: &CycleReport) {
        self.received += other.received;
        self.redirected += other.redirected;
        self.rejected += other.rejected;
        self.ignored += other.ignored;
        self.malformed += other.malformed;
        self.starved_ports += other.starved_ports;
        self.oversized += other.oversized;
    }
}

/// Totals from a run of the polling loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub overruns: u64,
    pub frames: CycleReport,
}

/// Single-threaded poll-and-redirect loop over a fixed set of ports
pub struct RedirectEngine<P: Port, C: Clock = MonotonicClock> {
    ports: Vec<P>,
    stats: Vec<Arc<PortStats>>,
    mode: Mode,
    burst_size: usize,
    scheduler: CycleScheduler<C>,
    metrics: Arc<MetricsRegistry>,
    stats_every: u64,
    remote_ports: Vec<usize>,
    rx: Vec<Frame>,
    tx: Vec<Frame>,
}

impl<P: Port, C: Clock> RedirectEngine<P, C> {
    /// Builds an engine over ports that are already configured and started.
    pub fn new(
        ports: Vec<P>,
        settings: EngineSettings,
        clock: C,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        if ports.is_empty() {
            return Err(Error::Config("no ports to poll".into()));
        }
        if settings.mode == Mode::Forwarding && ports.len() % 2 != 0 {
            return Err(Error::Config(format!(
                "forwarding mode needs an even number of ports, got {}",
                ports.len()
            )));
        }
        // a port's id is its position in `ports`
        if let Some((_, port)) = ports
            .iter()
            .enumerate()
            .find(|(index, port)| usize::from(port.id()) != *index)
        {
            return Err(Error::InvalidPort { port: port.id() });
        }
        if settings.burst_size == 0 {
            return Err(Error::Config("burst size must be at least 1".into()));
        }
        if settings.period.is_zero() {
            return Err(Error::Config("cycle period must be non-zero".into()));
        }

        let stats = ports
            .iter()
            .map(|p| metrics.register_port(p.name()))
            .collect();

        let stats_every = if settings.stats_interval.is_zero() {
            0
        } else {
            let cycles = settings.stats_interval.as_nanos() / settings.period.as_nanos();
            u64::try_from(cycles).unwrap_or(u64::MAX).max(1)
        };

        Ok(Self {
            ports,
            stats,
            mode: settings.mode,
            burst_size: settings.burst_size,
            scheduler: CycleScheduler::new(settings.period, clock),
            metrics,
            stats_every,
            remote_ports: Vec::new(),
            rx: Vec::with_capacity(settings.burst_size),
            tx: Vec::with_capacity(1),
        })
    }

    /// Warns about ports attached to a different NUMA node than the polling
    /// core, and remembers them. Advisory only.
    pub fn check_locality(&mut self, polling_socket: Option<u32>) -> &[usize] {
        self.remote_ports.clear();
        let Some(local) = polling_socket else {
            return &self.remote_ports;
        };
        for (index, port) in self.ports.iter().enumerate() {
            if let Some(socket) = port.socket_id() {
                if socket != local {
                    warn!(
                        "Port {} ({}) is on remote NUMA node {} to polling thread on node {}. \
                         Performance will not be optimal.",
                        port.id(),
                        port.name(),
                        socket,
                        local
                    );
                    self.remote_ports.push(index);
                }
            }
        }
        &self.remote_ports
    }

    /// Runs one cycle over every port without waiting.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for index in 0..self.ports.len() {
            let port_report = self.poll_port(index);
            report.merge(&port_report);
        }
        self.metrics.engine.cycles.inc();
        report
    }

    /// Polls until `stop` is set, checking it once per cycle.
    pub fn run(&mut self, stop: &AtomicBool) -> RunSummary {
        info!(
            "Redirecting SV/GOOSE frames on {} port(s), mode={}, period={:?}, burst={}",
            self.ports.len(),
            self.mode,
            self.scheduler.period(),
            self.burst_size
        );
        self.run_while(|_| !stop.load(Ordering::Relaxed))
    }

    /// Runs exactly `cycles` cycles on the schedule.
    pub fn run_cycles(&mut self, cycles: u64) -> RunSummary {
        self.run_while(|done| done < cycles)
    }

    fn run_while(&mut self, mut keep_going: impl FnMut(u64) -> bool) -> RunSummary {
        let mut summary = RunSummary::default();
        self.scheduler.start();

        while keep_going(summary.cycles) {
            let report = self.run_cycle();
            summary.frames.merge(&report);
            summary.cycles += 1;

            if self.stats_every != 0 && summary.cycles % self.stats_every == 0 {
                info!("stats: {}", self.metrics.summary());
            }

            if self.scheduler.advance_and_wait() == Wake::Overrun {
                summary.overruns += 1;
                self.metrics.engine.overruns.inc();
            }
        }

        summary
    }

    fn poll_port(&mut self, index: usize) -> CycleReport {
        let mut report = CycleReport::default();
        let dst = self.mode.destination(index);

        let mut rx = std::mem::take(&mut self.rx);
        let burst = self.ports[index].receive_burst(&mut rx, self.burst_size);
        report.received = rx.len();
        if burst.pool_exhausted {
            report.starved_ports = 1;
            self.stats[index].rx_nobuf.inc();
            debug!("{}: frame pool exhausted, burst cut short", self.ports[index].name());
        }
        if burst.oversized > 0 {
            report.oversized = burst.oversized;
            self.stats[index].rx_oversize.add(burst.oversized as u64);
            debug!(
                "{}: {} frame(s) larger than a pool buffer dropped",
                self.ports[index].name(),
                burst.oversized
            );
        }

        for mut frame in rx.drain(..) {
            self.stats[index].record_rx(frame.len());

            let protocol = match classify(frame.as_bytes()) {
                Classification::Interesting(protocol) => protocol,
                Classification::Ignored => {
                    if frame.len() < HEADER_LEN {
                        self.stats[index].malformed.inc();
                        report.malformed += 1;
                    } else {
                        self.stats[index].ignored.inc();
                        report.ignored += 1;
                    }
                    frame.release();
                    continue;
                }
            };

            if frame.len() < MIN_APPID_FRAME_LEN || mutate(&mut frame).is_err() {
                self.stats[index].malformed.inc();
                report.malformed += 1;
                frame.release();
                continue;
            }

            let len = frame.len();
            self.tx.push(frame);
            if self.ports[dst].transmit_burst(&mut self.tx) == 0 {
                self.stats[dst].tx_rejected.inc();
                report.rejected += 1;
                debug!("{}: TX refused {:?} frame", self.ports[dst].name(), protocol);
                self.tx.drain(..).for_each(Frame::release);
            } else {
                self.stats[dst].record_tx(len);
                report.redirected += 1;
                trace!(
                    "{:?} frame redirected {} -> {}",
                    protocol,
                    self.ports[index].name(),
                    self.ports[dst].name()
                );
            }
        }

        self.rx = rx;
        report
    }

    pub fn ports(&self) -> &[P] {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut [P] {
        &mut self.ports
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn scheduler(&self) -> &CycleScheduler<C> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Hands the ports back, e.g. for teardown.
    pub fn into_ports(self) -> Vec<P> {
        self.ports
    }
}
