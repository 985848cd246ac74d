//! iecloop - IEC 61850 frame redirector
//!
//! Polls network ports on a fixed cycle, picks out Sampled Values and GOOSE
//! frames, rewrites their Ethernet and APPID headers in place and sends them
//! back out, either on the port they arrived on or on its paired port.
//! Everything else is dropped.

pub mod buffer;
pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod telemetry;

pub use error::{Error, Result};
