//! Ethertype classification
//!
//! Decides whether a frame is one the redirector turns around. Only the
//! EtherType at offset 12 is read; anything too short to carry it is
//! ignored.

use crate::protocol::ethernet::{ETHERTYPE_OFFSET, HEADER_LEN};
use crate::protocol::EtherType;

/// IEC 61850 protocol carried by an interesting frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    SampledValues,
    Goose,
}

/// Outcome of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// SV or GOOSE: mutate and send back out
    Interesting(Protocol),
    /// Everything else, including runts: drop
    Ignored,
}

impl Classification {
    pub fn is_interesting(&self) -> bool {
        matches!(self, Classification::Interesting(_))
    }
}

/// Classifies a frame by its EtherType.
#[inline]
pub fn classify(frame: &[u8]) -> Classification {
    if frame.len() < HEADER_LEN {
        return Classification::Ignored;
    }

    let ethertype = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    match EtherType::from_u16(ethertype) {
        Some(EtherType::SampledValues) => Classification::Interesting(Protocol::SampledValues),
        Some(EtherType::Goose) => Classification::Interesting(Protocol::Goose),
        _ => Classification::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuilder, MacAddr};

    fn frame_with(ethertype: u16) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr([0x01, 0x0c, 0xcd, 0x04, 0x00, 0x01]))
            .src_mac(MacAddr([0x00, 0x30, 0xa7, 0x00, 0x00, 0x01]))
            .ethertype(ethertype)
            .appid(0x40, 0x00)
            .build()
    }

    #[test]
    fn test_sv_and_goose_are_interesting() {
        assert_eq!(
            classify(&frame_with(0x88BA)),
            Classification::Interesting(Protocol::SampledValues)
        );
        assert_eq!(
            classify(&frame_with(0x88B8)),
            Classification::Interesting(Protocol::Goose)
        );
    }

    #[test]
    fn test_other_ethertypes_ignored() {
        for ethertype in [0x0800, 0x0806, 0x8100, 0x86DD, 0x88B9, 0x88BB, 0xBA88, 0x0000] {
            assert_eq!(
                classify(&frame_with(ethertype)),
                Classification::Ignored,
                "ethertype {:#06x}",
                ethertype
            );
        }
    }

    #[test]
    fn test_runt_ignored() {
        let mut frame = frame_with(0x88BA);
        frame.truncate(13);
        assert_eq!(classify(&frame), Classification::Ignored);
        assert_eq!(classify(&[]), Classification::Ignored);
    }

    #[test]
    fn test_header_only_frame_still_classified() {
        let mut frame = frame_with(0x88B8);
        frame.truncate(HEADER_LEN);
        assert!(classify(&frame).is_interesting());
    }
}
