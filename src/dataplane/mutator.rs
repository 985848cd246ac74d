//! In-place rewrite of SV/GOOSE frames
//!
//! Swaps the MAC addresses so the frame heads back toward its sender, then
//! rotates the APPID counters: the sender slot moves into the receiver slot
//! and the sender slot is cleared. Length is unchanged and nothing is
//! allocated.

use crate::buffer::Frame;
use crate::protocol::ethernet::{
    APPID_OFFSET, DST_MAC_OFFSET, ETHERTYPE_OFFSET, MIN_APPID_FRAME_LEN, SRC_MAC_OFFSET,
};
use crate::{Error, Result};

/// Rewrites an interesting frame in place.
///
/// The caller must have classified the frame as interesting and checked it
/// holds at least [`MIN_APPID_FRAME_LEN`] bytes. A shorter frame trips a
/// debug assertion; release builds refuse it and leave it untouched so it
/// can be dropped.
pub fn mutate(frame: &mut Frame) -> Result<()> {
    mutate_bytes(frame.as_mut_bytes())
}

/// [`mutate`] over a raw byte slice.
pub fn mutate_bytes(bytes: &mut [u8]) -> Result<()> {
    debug_assert!(
        bytes.len() >= MIN_APPID_FRAME_LEN,
        "mutate called on a {} byte frame",
        bytes.len()
    );
    if bytes.len() < MIN_APPID_FRAME_LEN {
        return Err(Error::InvalidPacket(format!(
            "{} byte frame cannot carry an APPID pair",
            bytes.len()
        )));
    }

    let (dst, src) = bytes[DST_MAC_OFFSET..ETHERTYPE_OFFSET].split_at_mut(SRC_MAC_OFFSET);
    dst.swap_with_slice(src);

    let appid = &mut bytes[APPID_OFFSET..APPID_OFFSET + 2];
    appid[1] = appid[0];
    appid[0] = 0;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EtherType, EthernetHeader, FrameBuilder, MacAddr};

    const AA: MacAddr = MacAddr([0xaa; 6]);
    const BB: MacAddr = MacAddr([0xbb; 6]);

    fn goose(src: MacAddr, dst: MacAddr, appid: [u8; 2], payload: &[u8]) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(dst)
            .src_mac(src)
            .ethertype(EtherType::Goose as u16)
            .appid(appid[0], appid[1])
            .payload(payload)
            .build()
    }

    #[test]
    fn test_goose_scenario() {
        let mut frame = goose(AA, BB, [0x05, 0x00], &[]);
        mutate_bytes(&mut frame).unwrap();

        let header = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(header.src_mac(), BB);
        assert_eq!(header.dst_mac(), AA);
        assert_eq!(header.ethertype(), 0x88B8);
        assert_eq!(header.appid(), Some([0x00, 0x05]));
    }

    #[test]
    fn test_only_header_and_appid_change() {
        let payload: Vec<u8> = (0u8..64).collect();
        let original = goose(
            MacAddr([0x00, 0x30, 0xa7, 0x11, 0x22, 0x33]),
            MacAddr([0x01, 0x0c, 0xcd, 0x01, 0x00, 0x10]),
            [0x7f, 0x42],
            &payload,
        );
        let mut frame = original.clone();
        mutate_bytes(&mut frame).unwrap();

        assert_eq!(frame.len(), original.len());
        assert_eq!(&frame[0..6], &original[6..12]);
        assert_eq!(&frame[6..12], &original[0..6]);
        assert_eq!(&frame[12..14], &original[12..14]);
        assert_eq!(frame[14], 0);
        assert_eq!(frame[15], original[14]);
        assert_eq!(&frame[16..], &original[16..]);
    }

    #[test]
    fn test_twice_restores_macs_but_not_appid() {
        let original = goose(AA, BB, [0x05, 0x09], &[1, 2, 3]);
        let mut frame = original.clone();
        mutate_bytes(&mut frame).unwrap();
        mutate_bytes(&mut frame).unwrap();

        assert_eq!(&frame[0..12], &original[0..12]);
        assert_eq!(&frame[14..16], &[0x00, 0x00]);
        assert_ne!(&frame[14..16], &original[14..16]);
    }

    #[test]
    fn test_mutate_leased_frame() {
        let pool = crate::buffer::FramePool::new(1, 128).unwrap();
        let mut frame = pool
            .lease_copy(0, &goose(AA, BB, [0x05, 0x00], &[0xee]))
            .unwrap();
        mutate(&mut frame).unwrap();
        assert_eq!(&frame.as_bytes()[0..6], &AA.0);
        assert_eq!(frame.byte_at(15), Some(0x05));
        assert_eq!(frame.len(), 17);
        frame.release();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "mutate called on a 15 byte frame")]
    fn test_short_frame_asserts_in_debug() {
        let mut frame = goose(AA, BB, [0x05, 0x00], &[]);
        frame.truncate(15);
        let _ = mutate_bytes(&mut frame);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_short_frame_refused_in_release() {
        let mut frame = goose(AA, BB, [0x05, 0x00], &[]);
        frame.truncate(15);
        let before = frame.clone();
        assert!(mutate_bytes(&mut frame).is_err());
        assert_eq!(frame, before);
    }
}
