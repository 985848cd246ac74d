//! Fixed-capacity frame buffer pool

use super::{Frame, PortId};
use crate::telemetry::Counter;
use crate::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};

pub(super) struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
    buffer_size: usize,
    capacity: usize,
    leased: Counter,
    released: Counter,
    reclaimed: Counter,
    exhausted: Counter,
}

impl PoolShared {
    /// Puts a buffer back on the free list. `explicit` is false when the
    /// frame was dropped instead of released.
    pub(super) fn give_back(&self, buf: Box<[u8]>, explicit: bool) {
        if explicit {
            self.released.inc();
        } else {
            self.reclaimed.inc();
        }
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}

/// Point-in-time view of pool accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub available: usize,
    pub leased: u64,
    pub released: u64,
    pub reclaimed: u64,
    pub exhausted: u64,
}

impl PoolSnapshot {
    /// Leases not yet returned by any path.
    ///
    /// Taken while other threads use the pool, this is approximate but never
    /// underflows.
    pub fn outstanding(&self) -> u64 {
        self.leased
            .saturating_sub(self.released)
            .saturating_sub(self.reclaimed)
    }
}

/// Shared pool of frame buffers
///
/// Cloning is cheap and yields a handle to the same pool. Lease and release
/// take a short lock, so one pool may back engines on several cores.
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// Allocates `capacity` buffers of `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize) -> Result<Self> {
        if capacity == 0 || buffer_size == 0 {
            return Err(Error::Config(format!(
                "cannot create frame pool with {} buffers of {} bytes",
                capacity, buffer_size
            )));
        }

        let mut free = Vec::new();
        free.try_reserve_exact(capacity)
            .map_err(|_| Error::PoolExhausted)?;
        for _ in 0..capacity {
            free.push(vec![0u8; buffer_size].into_boxed_slice());
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                buffer_size,
                capacity,
                leased: Counter::new(),
                released: Counter::new(),
                reclaimed: Counter::new(),
                exhausted: Counter::new(),
            }),
        })
    }

    /// Leases an empty frame attributed to `port`, or `None` when every
    /// buffer is out.
    pub fn lease(&self, port: PortId) -> Option<Frame> {
        let buf = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match buf {
            Some(buf) => {
                self.shared.leased.inc();
                Some(Frame::new(buf, port, Arc::clone(&self.shared)))
            }
            None => {
                self.shared.exhausted.inc();
                None
            }
        }
    }

    /// Leases a frame and fills it with `data`.
    ///
    /// Fails with `InvalidPacket` if `data` does not fit in one buffer, in
    /// which case nothing stays leased.
    pub fn lease_copy(&self, port: PortId, data: &[u8]) -> Result<Frame> {
        if data.len() > self.shared.buffer_size {
            return Err(Error::InvalidPacket(format!(
                "{} byte frame exceeds {} byte buffers",
                data.len(),
                self.shared.buffer_size
            )));
        }
        let mut frame = self.lease(port).ok_or(Error::PoolExhausted)?;
        frame.buffer_mut()[..data.len()].copy_from_slice(data);
        frame.set_len(data.len());
        Ok(frame)
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn available(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        // Returns are read before leases so a concurrent lease/release pair
        // can only make `leased` look larger, never smaller.
        let released = self.shared.released.get();
        let reclaimed = self.shared.reclaimed.get();
        let leased = self.shared.leased.get();
        PoolSnapshot {
            capacity: self.shared.capacity,
            available: self.available(),
            leased,
            released,
            reclaimed,
            exhausted: self.shared.exhausted.get(),
        }
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.shared.capacity)
            .field("buffer_size", &self.shared.buffer_size)
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_and_release() {
        let pool = FramePool::new(4, 128).unwrap();
        let frame = pool.lease(0).unwrap();
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.snapshot().outstanding(), 1);

        frame.release();
        let snap = pool.snapshot();
        assert_eq!(snap.available, 4);
        assert_eq!(snap.leased, 1);
        assert_eq!(snap.released, 1);
        assert_eq!(snap.reclaimed, 0);
        assert_eq!(snap.outstanding(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let pool = FramePool::new(2, 64).unwrap();
        let a = pool.lease(0).unwrap();
        let b = pool.lease(0).unwrap();
        assert!(pool.lease(0).is_none());
        assert_eq!(pool.snapshot().exhausted, 1);

        a.release();
        let c = pool.lease(1).unwrap();
        assert_eq!(c.origin_port(), 1);
        b.release();
        c.release();
        assert_eq!(pool.snapshot().outstanding(), 0);
    }

    #[test]
    fn test_drop_is_reclaimed_not_released() {
        let pool = FramePool::new(1, 64).unwrap();
        {
            let _frame = pool.lease(0).unwrap();
        }
        let snap = pool.snapshot();
        assert_eq!(snap.available, 1);
        assert_eq!(snap.released, 0);
        assert_eq!(snap.reclaimed, 1);
        assert_eq!(snap.outstanding(), 0);
    }

    #[test]
    fn test_lease_copy() {
        let pool = FramePool::new(2, 16).unwrap();
        let frame = pool.lease_copy(3, &[1, 2, 3]).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert_eq!(frame.origin_port(), 3);
        frame.release();

        assert!(matches!(
            pool.lease_copy(0, &[0u8; 17]),
            Err(Error::InvalidPacket(_))
        ));
        assert_eq!(pool.snapshot().outstanding(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(FramePool::new(0, 2048).is_err());
        assert!(FramePool::new(16, 0).is_err());
    }

    #[test]
    fn test_outstanding_never_underflows() {
        let snap = PoolSnapshot {
            leased: 3,
            released: 4,
            reclaimed: 1,
            ..PoolSnapshot::default()
        };
        assert_eq!(snap.outstanding(), 0);
    }

    #[test]
    fn test_snapshot_while_other_threads_lease() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let pool = FramePool::new(8, 64).unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            for port in 0..2 {
                let pool = pool.clone();
                let done = &done;
                s.spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        if let Some(frame) = pool.lease(port) {
                            frame.release();
                        }
                    }
                });
            }

            for _ in 0..200_000 {
                let snap = pool.snapshot();
                assert!(snap.outstanding() <= snap.leased);
            }
            done.store(true, Ordering::Relaxed);
        });

        let snap = pool.snapshot();
        assert_eq!(snap.outstanding(), 0);
        assert_eq!(snap.available, 8);
    }

    #[test]
    fn test_shared_across_clones() {
        let pool = FramePool::new(2, 64).unwrap();
        let other = pool.clone();
        let frame = other.lease(0).unwrap();
        assert_eq!(pool.available(), 1);
        frame.release();
        assert_eq!(pool.available(), 2);
    }
}
