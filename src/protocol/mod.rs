//! Link-layer definitions for the frames the redirector touches
//!
//! Only the Ethernet II header and the two APPID counter bytes that follow
//! it are interpreted. SV and GOOSE payloads are carried opaquely.

pub mod ethernet;
pub mod types;

pub use ethernet::{EthernetHeader, FrameBuilder};
pub use types::*;
