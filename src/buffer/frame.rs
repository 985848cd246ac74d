//! Move-only leased frame

use super::pool::PoolShared;
use super::PortId;
use std::fmt;
use std::sync::Arc;

/// One received network frame and the pool buffer backing it
///
/// Every public access is bounded by [`Frame::len`]. Only the crate's
/// receive paths reach the bytes past `len`, to fill a fresh lease.
pub struct Frame {
    buf: Option<Box<[u8]>>,
    len: usize,
    port: PortId,
    pool: Arc<PoolShared>,
}

impl Frame {
    pub(super) fn new(buf: Box<[u8]>, port: PortId, pool: Arc<PoolShared>) -> Self {
        Self {
            buf: Some(buf),
            len: 0,
            port,
            pool,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Port the frame was received on.
    pub fn origin_port(&self) -> PortId {
        self.port
    }

    pub fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf[..self.len],
            None => &[],
        }
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        let len = self.len;
        match &mut self.buf {
            Some(buf) => &mut buf[..len],
            None => &mut [],
        }
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.as_bytes().get(offset).copied()
    }

    /// `n` bytes starting at `offset`, or `None` if that would pass the end
    /// of the frame.
    pub fn bytes_at(&mut self, offset: usize, n: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(n)?;
        self.as_mut_bytes().get_mut(offset..end)
    }

    /// The whole underlying buffer, regardless of the current length.
    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf,
            None => &mut [],
        }
    }

    /// Sets the frame length, clamped to the buffer capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    /// Returns the buffer to its pool.
    pub fn release(mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf, true);
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf, false);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("port", &self.port)
            .finish()
    }
}
