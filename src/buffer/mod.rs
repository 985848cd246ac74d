//! Frame buffers
//!
//! A [`FramePool`] owns a fixed set of equally sized buffers. Ports lease a
//! buffer per received frame and the lease travels as a move-only [`Frame`]
//! until it is either handed to a transmit path or released. Because
//! [`Frame::release`] consumes the frame, releasing twice does not compile;
//! a frame that is dropped without being released is still returned to the
//! pool but is counted as `reclaimed`, so leaks show up in tests.

mod frame;
mod pool;

pub use frame::Frame;
pub use pool::{FramePool, PoolSnapshot};

/// Port identifier, as used for frame origin and port pairing
pub type PortId = u16;
