//! Ethernet II header layout and frame construction

use super::MacAddr;
use crate::{Error, Result};

/// Offset of the destination MAC address
pub const DST_MAC_OFFSET: usize = 0;
/// Offset of the source MAC address
pub const SRC_MAC_OFFSET: usize = 6;
/// Offset of the EtherType field
pub const ETHERTYPE_OFFSET: usize = 12;
/// Length of an untagged Ethernet header; also the shortest frame we look at
pub const HEADER_LEN: usize = 14;
/// Offset of the APPID counter pair, immediately after the header
pub const APPID_OFFSET: usize = HEADER_LEN;
/// Shortest frame whose APPID pair can be rewritten
pub const MIN_APPID_FRAME_LEN: usize = APPID_OFFSET + 2;
/// Maximum Ethernet frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;

/// Read-only view of an Ethernet II header
///
/// Only valid while the underlying buffer holds at least [`HEADER_LEN`] bytes,
/// which [`EthernetHeader::parse`] checks once up front.
#[derive(Debug, Clone, Copy)]
pub struct EthernetHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Parse(format!(
                "frame too short for Ethernet header: {} bytes",
                buffer.len()
            )));
        }
        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(mac_at(self.buffer, DST_MAC_OFFSET))
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(mac_at(self.buffer, SRC_MAC_OFFSET))
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([
            self.buffer[ETHERTYPE_OFFSET],
            self.buffer[ETHERTYPE_OFFSET + 1],
        ])
    }

    /// The APPID counter pair, when the frame is long enough to carry one.
    pub fn appid(&self) -> Option<[u8; 2]> {
        self.buffer
            .get(APPID_OFFSET..MIN_APPID_FRAME_LEN)
            .map(|b| [b[0], b[1]])
    }
}

fn mac_at(buffer: &[u8], offset: usize) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buffer[offset..offset + 6]);
    mac
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    /// Appends the two APPID counter bytes: sender slot, then receiver slot.
    pub fn appid(mut self, sender: u8, receiver: u8) -> Self {
        self.buffer.extend_from_slice(&[sender, receiver]);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
