//! Common protocol types

use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Reads the hardware address of a Linux interface from sysfs.
    pub fn from_sysfs(ifname: &str) -> Option<MacAddr> {
        let path = format!("/sys/class/net/{}/address", ifname);
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError(String);

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts colon- or hyphen-separated hex octets ("00:11:22:33:44:55").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError(s.to_string());
        let mut out = [0u8; 6];
        let mut octets = s.split(|c| c == ':' || c == '-');

        for slot in out.iter_mut() {
            let octet = octets.next().filter(|o| o.len() == 2).ok_or_else(err)?;
            *slot = u8::from_str_radix(octet, 16).map_err(|_| err())?;
        }
        if octets.next().is_some() {
            return Err(err());
        }

        Ok(MacAddr(out))
    }
}

/// EtherType values the redirector knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Arp = 0x0806,
    /// IEC 61850-8-1 GOOSE
    Goose = 0x88B8,
    /// IEC 61850-9-2 Sampled Values
    SampledValues = 0x88BA,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0806 => Some(EtherType::Arp),
            0x88B8 => Some(EtherType::Goose),
            0x88BA => Some(EtherType::SampledValues),
            _ => None,
        }
    }
}
