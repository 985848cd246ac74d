//! E2E tests over a veth pair
//!
//! Run with: sudo -E cargo test --test e2e -- --ignored

mod veth;

use iecloop::buffer::{Frame, FramePool};
use iecloop::capture::{bring_up, AfPacketPort, Port, PortConf};
use iecloop::dataplane::{EngineSettings, Mode, MonotonicClock, RedirectEngine};
use iecloop::protocol::{EtherType, EthernetHeader, FrameBuilder, MacAddr};
use iecloop::telemetry::MetricsRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use veth::VethPair;

const PEER: MacAddr = MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
const SV_DST: MacAddr = MacAddr([0x01, 0x0c, 0xcd, 0x04, 0x00, 0x01]);

fn open(name: &str, id: u16, pool: &FramePool) -> AfPacketPort {
    let mut port = AfPacketPort::open(name, id, pool.clone()).expect("Failed to open port");
    bring_up(&mut port, &PortConf::default()).expect("Failed to bring up port");
    port
}

/// Wait for the redirected SV frame to show up on the peer end
fn wait_for_sv(port: &mut AfPacketPort, timeout: Duration) -> Option<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut frames: Vec<Frame> = Vec::new();
    while Instant::now() < deadline {
        port.receive_burst(&mut frames, 32);
        let mut found = None;
        for frame in frames.drain(..) {
            if found.is_none() {
                if let Ok(header) = EthernetHeader::parse(frame.as_bytes()) {
                    if header.ethertype() == EtherType::SampledValues as u16 {
                        found = Some(frame.as_bytes().to_vec());
                    }
                }
            }
            frame.release();
        }
        if found.is_some() {
            return found;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

/// Inject an SV frame on one end of a veth pair and expect it back,
/// rewritten, from the redirector polling the other end.
///
/// Topology:
///   test (peer end) -- veth -- iecloop (loopback)
#[test]
#[ignore] // Requires root for AF_PACKET and veth creation
fn test_loopback_over_veth() {
    let pair = VethPair::create().expect("Failed to create veth pair");
    let pool = FramePool::new(512, 2048).unwrap();

    let mut peer = open(&pair.b, 1, &pool);
    let redirector = open(&pair.a, 0, &pool);

    let settings = EngineSettings {
        mode: Mode::Loopback,
        ..EngineSettings::default()
    };
    let mut engine = RedirectEngine::new(
        vec![redirector],
        settings,
        MonotonicClock,
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let engine_stop = stop.clone();
    let handle = std::thread::spawn(move || engine.run(&engine_stop));

    let data = FrameBuilder::new()
        .dst_mac(SV_DST)
        .src_mac(PEER)
        .ethertype(EtherType::SampledValues as u16)
        .appid(0x05, 0x00)
        .payload(&[0u8; 60])
        .build();
    let mut out = vec![pool.lease_copy(1, &data).unwrap()];
    assert_eq!(peer.transmit_burst(&mut out), 1);

    let reply = wait_for_sv(&mut peer, Duration::from_secs(2));

    stop.store(true, Ordering::Relaxed);
    let summary = handle.join().unwrap();

    let reply = reply.expect("No SV frame came back");
    assert_eq!(&reply[0..6], &PEER.0);
    assert_eq!(&reply[6..12], &SV_DST.0);
    assert_eq!(&reply[14..16], &[0x00, 0x05]);
    assert!(summary.frames.redirected >= 1);
}

/// A frame longer than the pool's buffers must be dropped on receive, not
/// redirected cut down to the buffer size.
#[test]
#[ignore] // Requires root for AF_PACKET and veth creation
fn test_frame_longer_than_buffer_dropped() {
    let pair = VethPair::create().expect("Failed to create veth pair");
    let small = FramePool::new(64, 128).unwrap();
    let large = FramePool::new(64, 2048).unwrap();

    let mut peer = open(&pair.b, 1, &large);
    let redirector = open(&pair.a, 0, &small);

    let metrics = Arc::new(MetricsRegistry::new());
    let mut engine = RedirectEngine::new(
        vec![redirector],
        EngineSettings::default(),
        MonotonicClock,
        metrics.clone(),
    )
    .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let engine_stop = stop.clone();
    let handle = std::thread::spawn(move || engine.run(&engine_stop));

    let data = FrameBuilder::new()
        .dst_mac(SV_DST)
        .src_mac(PEER)
        .ethertype(EtherType::SampledValues as u16)
        .appid(0x05, 0x00)
        .payload(&[0u8; 300])
        .build();
    let mut out = vec![large.lease_copy(1, &data).unwrap()];
    assert_eq!(peer.transmit_burst(&mut out), 1);

    let reply = wait_for_sv(&mut peer, Duration::from_millis(500));

    stop.store(true, Ordering::Relaxed);
    let summary = handle.join().unwrap();

    assert!(reply.is_none(), "truncated SV frame was redirected");
    assert_eq!(summary.frames.redirected, 0);
    assert!(summary.frames.oversized >= 1);
    assert!(metrics.port(&pair.a).unwrap().rx_oversize.get() >= 1);
    assert_eq!(small.snapshot().outstanding(), 0);
}
