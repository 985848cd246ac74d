//! Port backends
//!
//! A [`Port`] is one RX queue and one TX queue on a network interface.
//! Receive and transmit are non-blocking bursts; frames are leased from a
//! [`FramePool`](crate::buffer::FramePool) on receive and handed back to it
//! by the transmit path once sent.
//!
//! - AF_PACKET: raw socket on a Linux interface, no special setup required
//! - Memory: in-process queues, for tests and self-test traffic

mod af_packet;
mod memory;

pub use af_packet::AfPacketPort;
pub use memory::MemoryPort;

use crate::buffer::{Frame, PortId};
use crate::protocol::MacAddr;
use crate::Result;
use tracing::info;

/// Result of one receive burst
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxBurst {
    /// Frames appended to the caller's vector
    pub received: usize,
    /// Frames were waiting but no buffer could be leased for them
    pub pool_exhausted: bool,
    /// Frames longer than a pool buffer, dropped by the port
    pub oversized: usize,
}

/// Queue sizing applied when a port is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConf {
    /// Receive ring depth, in frames
    pub rx_ring: usize,
    /// Transmit ring depth, in frames
    pub tx_ring: usize,
}

impl Default for PortConf {
    fn default() -> Self {
        Self {
            rx_ring: 1024,
            tx_ring: 1024,
        }
    }
}

/// One network interface queue pair
///
/// Ports are configured and started once, before polling begins, and are
/// never reconfigured while the loop runs.
pub trait Port {
    /// Position of the port in the engine's port list.
    fn id(&self) -> PortId;

    fn name(&self) -> &str;

    fn mac_addr(&self) -> MacAddr;

    /// NUMA node the device is attached to, if known.
    fn socket_id(&self) -> Option<u32>;

    fn configure(&mut self, conf: &PortConf) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Appends up to `max` immediately available frames to `frames`.
    ///
    /// Never waits for more to arrive.
    fn receive_burst(&mut self, frames: &mut Vec<Frame>, max: usize) -> RxBurst;

    /// Takes frames from the front of `frames` until the TX queue refuses
    /// one, and returns how many were taken.
    ///
    /// Accepted frames belong to the port, which returns them to their pool
    /// once sent. Frames left in `frames` still belong to the caller.
    fn transmit_burst(&mut self, frames: &mut Vec<Frame>) -> usize;
}

/// Configures and starts a port, then logs its identity.
pub fn bring_up<P: Port>(port: &mut P, conf: &PortConf) -> Result<()> {
    port.configure(conf)?;
    port.start()?;
    info!(
        "Port {} ({}) MAC: {}, NUMA socket: {}",
        port.id(),
        port.name(),
        port.mac_addr(),
        port.socket_id()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string())
    );
    Ok(())
}
