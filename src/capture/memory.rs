//! In-process port
//!
//! Frames injected with [`MemoryPort::inject`] wait in an RX queue until a
//! receive burst leases buffers for them. Like a NIC, the port drops frames
//! that do not fit a pool buffer instead of handing them on cut short. Transmitted frames sit in a
//! bounded TX ring until [`MemoryPort::complete_tx`] plays the NIC and
//! returns them to the pool. A full TX ring refuses further frames, which is
//! how tests provoke backpressure.

use super::{Port, PortConf, RxBurst};
use crate::buffer::{Frame, FramePool, PortId};
use crate::protocol::ethernet::MAX_FRAME_SIZE;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::collections::VecDeque;

pub struct MemoryPort {
    id: PortId,
    name: String,
    mac: MacAddr,
    pool: FramePool,
    rx: VecDeque<Vec<u8>>,
    tx: VecDeque<Frame>,
    tx_capacity: usize,
    started: bool,
    rx_calls: u64,
}

impl MemoryPort {
    pub fn new(id: PortId, name: impl Into<String>, pool: FramePool) -> Self {
        Self {
            id,
            name: name.into(),
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, (id >> 8) as u8, id as u8]),
            pool,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            tx_capacity: PortConf::default().tx_ring,
            started: false,
            rx_calls: 0,
        }
    }

    /// Queues raw frame bytes for a later receive burst.
    ///
    /// Fails for frames longer than a VLAN-tagged Ethernet frame.
    pub fn inject(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(Error::InvalidPacket(format!(
                "{} byte frame exceeds the {} byte Ethernet maximum",
                data.len(),
                MAX_FRAME_SIZE
            )));
        }
        self.rx.push_back(data.to_vec());
        Ok(())
    }

    /// Overrides the TX ring depth; 0 refuses every frame.
    pub fn set_tx_capacity(&mut self, capacity: usize) {
        self.tx_capacity = capacity;
    }

    /// Frames still waiting to be received.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    /// Frames accepted for transmit and not yet completed.
    pub fn tx_pending(&self) -> usize {
        self.tx.len()
    }

    /// Number of receive bursts issued so far.
    pub fn rx_calls(&self) -> u64 {
        self.rx_calls
    }

    /// Finishes every pending transmission: copies the bytes out in send
    /// order and returns the buffers to the pool.
    pub fn complete_tx(&mut self) -> Vec<Vec<u8>> {
        self.tx
            .drain(..)
            .map(|frame| {
                let bytes = frame.as_bytes().to_vec();
                frame.release();
                bytes
            })
            .collect()
    }
}

impl Port for MemoryPort {
    fn id(&self) -> PortId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    fn socket_id(&self) -> Option<u32> {
        None
    }

    fn configure(&mut self, conf: &PortConf) -> Result<()> {
        if self.started {
            return Err(Error::PortConfig {
                port: self.id,
                reason: "already started".into(),
            });
        }
        self.tx_capacity = conf.tx_ring;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn receive_burst(&mut self, frames: &mut Vec<Frame>, max: usize) -> RxBurst {
        self.rx_calls += 1;
        let mut burst = RxBurst::default();
        if !self.started {
            return burst;
        }

        while burst.received < max {
            let Some(data) = self.rx.front() else { break };
            if data.len() > self.pool.buffer_size() {
                self.rx.pop_front();
                burst.oversized += 1;
                continue;
            }
            let Some(mut frame) = self.pool.lease(self.id) else {
                burst.pool_exhausted = true;
                break;
            };
            frame.buffer_mut()[..data.len()].copy_from_slice(data);
            frame.set_len(data.len());
            self.rx.pop_front();
            frames.push(frame);
            burst.received += 1;
        }

        burst
    }

    fn transmit_burst(&mut self, frames: &mut Vec<Frame>) -> usize {
        if !self.started {
            return 0;
        }
        let room = self.tx_capacity.saturating_sub(self.tx.len());
        let accepted = room.min(frames.len());
        self.tx.extend(frames.drain(..accepted));
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_port(pool: &FramePool) -> MemoryPort {
        let mut port = MemoryPort::new(0, "mem0", pool.clone());
        port.configure(&PortConf { rx_ring: 8, tx_ring: 2 }).unwrap();
        port.start().unwrap();
        port
    }

    #[test]
    fn test_receive_respects_max_and_order() {
        let pool = FramePool::new(8, 64).unwrap();
        let mut port = started_port(&pool);
        for i in 0..5u8 {
            port.inject(&[i; 20]).unwrap();
        }

        let mut frames = Vec::new();
        let burst = port.receive_burst(&mut frames, 3);
        assert_eq!(burst.received, 3);
        assert!(!burst.pool_exhausted);
        assert_eq!(port.rx_pending(), 2);
        let firsts: Vec<u8> = frames.iter().map(|f| f.as_bytes()[0]).collect();
        assert_eq!(firsts, vec![0, 1, 2]);

        frames.drain(..).for_each(Frame::release);
        assert_eq!(pool.snapshot().outstanding(), 0);
    }

    #[test]
    fn test_receive_stops_when_pool_empty() {
        let pool = FramePool::new(1, 64).unwrap();
        let mut port = started_port(&pool);
        port.inject(&[1; 20]).unwrap();
        port.inject(&[2; 20]).unwrap();

        let mut frames = Vec::new();
        let burst = port.receive_burst(&mut frames, 32);
        assert_eq!(burst.received, 1);
        assert!(burst.pool_exhausted);
        assert_eq!(port.rx_pending(), 1);
        frames.drain(..).for_each(Frame::release);
    }

    #[test]
    fn test_transmit_backpressure() {
        let pool = FramePool::new(4, 64).unwrap();
        let mut port = started_port(&pool);
        let mut frames: Vec<Frame> = (0..3u8)
            .map(|i| pool.lease_copy(0, &[i; 16]).unwrap())
            .collect();

        assert_eq!(port.transmit_burst(&mut frames), 2);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes()[0], 2);
        assert_eq!(port.transmit_burst(&mut frames), 0);

        let sent = port.complete_tx();
        assert_eq!(sent, vec![vec![0u8; 16], vec![1u8; 16]]);
        frames.drain(..).for_each(Frame::release);
        assert_eq!(pool.snapshot().outstanding(), 0);
    }

    #[test]
    fn test_idle_until_started() {
        let pool = FramePool::new(2, 64).unwrap();
        let mut port = MemoryPort::new(1, "mem1", pool.clone());
        port.inject(&[0; 14]).unwrap();

        let mut frames = Vec::new();
        assert_eq!(port.receive_burst(&mut frames, 4), RxBurst::default());
        assert_eq!(port.rx_calls(), 1);

        port.start().unwrap();
        assert!(port.configure(&PortConf::default()).is_err());
    }

    #[test]
    fn test_inject_beyond_ethernet_maximum() {
        let pool = FramePool::new(1, 32).unwrap();
        let mut port = MemoryPort::new(0, "mem0", pool);
        assert!(port.inject(&[0; MAX_FRAME_SIZE + 1]).is_err());
        assert!(port.inject(&[0; MAX_FRAME_SIZE]).is_ok());
    }

    #[test]
    fn test_frame_larger_than_buffer_dropped() {
        let pool = FramePool::new(4, 32).unwrap();
        let mut port = started_port(&pool);
        port.inject(&[1; 20]).unwrap();
        port.inject(&[2; 33]).unwrap();
        port.inject(&[3; 32]).unwrap();

        let mut frames = Vec::new();
        let burst = port.receive_burst(&mut frames, 8);
        assert_eq!(burst.received, 2);
        assert_eq!(burst.oversized, 1);
        assert_eq!(port.rx_pending(), 0);
        let lens: Vec<usize> = frames.iter().map(Frame::len).collect();
        assert_eq!(lens, vec![20, 32]);

        frames.drain(..).for_each(Frame::release);
        let snap = pool.snapshot();
        assert_eq!(snap.leased, 2);
        assert_eq!(snap.outstanding(), 0);
    }
}
