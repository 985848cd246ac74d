//! AF_PACKET port implementation
//!
//! A non-blocking raw socket bound to one interface. Receive copies each
//! waiting frame into a leased buffer; transmit hands the bytes to the
//! kernel and returns the buffer to the pool straight away.

use super::{Port, PortConf, RxBurst};
use crate::buffer::{Frame, FramePool, PortId};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::{debug, warn};

/// Not exported by every libc release; value from linux/if_packet.h.
const PACKET_IGNORE_OUTGOING: libc::c_int = 23;

/// AF_PACKET socket wrapper
pub struct AfPacketPort {
    fd: RawFd,
    id: PortId,
    name: String,
    ifindex: i32,
    mac: MacAddr,
    pool: FramePool,
    promisc: bool,
    started: bool,
}

impl AfPacketPort {
    /// Opens a raw socket bound to the named interface.
    ///
    /// Fails with `PortNotFound` if the interface does not exist.
    pub fn open(ifname: &str, id: PortId, pool: FramePool) -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };

        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let ifindex = match Self::get_ifindex(fd, ifname) {
            Ok(idx) => idx,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };

        let ret = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };

        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        Ok(Self {
            fd,
            id,
            name: ifname.to_string(),
            ifindex,
            mac: MacAddr::from_sysfs(ifname).unwrap_or(MacAddr::ZERO),
            pool,
            promisc: false,
            started: false,
        })
    }

    fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
        let not_found = || Error::PortNotFound {
            name: ifname.to_string(),
        };
        let ifname_c = CString::new(ifname).map_err(|_| not_found())?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let name_bytes = ifname_c.as_bytes_with_nul();
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(not_found());
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
            *dst = *src as libc::c_char;
        }

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(not_found());
        }

        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn set_promisc(&self, enable: bool) -> io::Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: self.ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };

        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };

        self.setsockopt(libc::SOL_PACKET, optname, &mreq)
    }

    fn setsockopt<T>(&self, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                level,
                name,
                value as *const T as *const libc::c_void,
                std::mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn config_error(&self, what: &str, err: io::Error) -> Error {
        Error::PortConfig {
            port: self.id,
            reason: format!("{} on {}: {}", what, self.name, err),
        }
    }

    /// Whether a frame is waiting, without consuming it.
    fn frame_waiting(&self) -> bool {
        let mut byte = 0u8;
        let n = unsafe {
            libc::recv(
                self.fd,
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        n >= 0
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }
}

/// Kernel socket buffer size for a ring of `frames` buffers.
fn socket_buffer_bytes(frames: usize, frame_bytes: usize) -> libc::c_int {
    libc::c_int::try_from(frames.saturating_mul(frame_bytes)).unwrap_or(libc::c_int::MAX)
}

impl Port for AfPacketPort {
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
        let path = format!("/sys/class/net/{}/device/numa_node", self.name);
        let node: i32 = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
        u32::try_from(node).ok()
    }

    fn configure(&mut self, conf: &PortConf) -> Result<()> {
        if self.started {
            return Err(Error::PortConfig {
                port: self.id,
                reason: "cannot reconfigure a started port".into(),
            });
        }

        let frame_bytes = self.pool.buffer_size();
        let rcvbuf = socket_buffer_bytes(conf.rx_ring, frame_bytes);
        let sndbuf = socket_buffer_bytes(conf.tx_ring, frame_bytes);
        self.setsockopt(libc::SOL_SOCKET, libc::SO_RCVBUF, &rcvbuf)
            .map_err(|e| self.config_error("SO_RCVBUF", e))?;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_SNDBUF, &sndbuf)
            .map_err(|e| self.config_error("SO_SNDBUF", e))?;

        // Our own transmissions would otherwise come straight back on RX.
        // Older kernels lack the option; receive_burst filters them too.
        let one: libc::c_int = 1;
        if let Err(e) = self.setsockopt(libc::SOL_PACKET, PACKET_IGNORE_OUTGOING, &one) {
            warn!("{}: PACKET_IGNORE_OUTGOING unavailable: {}", self.name, e);
        }

        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.promisc {
            self.set_promisc(true)
                .map_err(|e| self.config_error("promiscuous mode", e))?;
            self.promisc = true;
        }
        self.started = true;
        Ok(())
    }

    fn receive_burst(&mut self, frames: &mut Vec<Frame>, max: usize) -> RxBurst {
        let mut burst = RxBurst::default();
        if !self.started {
            return burst;
        }

        while burst.received < max {
            let Some(mut frame) = self.pool.lease(self.id) else {
                burst.pool_exhausted = self.frame_waiting();
                break;
            };

            let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            let buf = frame.buffer_mut();
            let n = unsafe {
                libc::recvfrom(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT | libc::MSG_TRUNC,
                    &mut from as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                    &mut from_len,
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    debug!("{}: recv failed: {}", self.name, err);
                }
                frame.release();
                break;
            }

            if from.sll_pkttype == libc::PACKET_OUTGOING as u8 {
                frame.release();
                continue;
            }

            // MSG_TRUNC reports the length on the wire, not what was copied
            let wire_len = n as usize;
            if wire_len > frame.capacity() {
                debug!(
                    "{}: dropped {} byte frame, buffers hold {}",
                    self.name,
                    wire_len,
                    frame.capacity()
                );
                frame.release();
                burst.oversized += 1;
                continue;
            }

            frame.set_len(wire_len);
            frames.push(frame);
            burst.received += 1;
        }

        burst
    }

    fn transmit_burst(&mut self, frames: &mut Vec<Frame>) -> usize {
        if !self.started {
            return 0;
        }

        let mut accepted = 0;
        for frame in frames.iter() {
            let bytes = frame.as_bytes();
            let n = unsafe {
                libc::send(
                    self.fd,
                    bytes.as_ptr() as *const libc::c_void,
                    bytes.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                let full = err.kind() == io::ErrorKind::WouldBlock
                    || err.raw_os_error() == Some(libc::ENOBUFS);
                if !full {
                    debug!("{}: send failed: {}", self.name, err);
                }
                break;
            }
            accepted += 1;
        }

        // sent frames are with the kernel now; their buffers go home
        frames.drain(..accepted).for_each(Frame::release);
        accepted
    }
}

impl AsRawFd for AfPacketPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for AfPacketPort {
    fn drop(&mut self) {
        if self.promisc {
            let _ = self.set_promisc(false);
        }
        unsafe { libc::close(self.fd) };
    }
}
