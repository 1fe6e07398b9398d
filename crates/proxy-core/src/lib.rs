//! proxy-core — wire format and configuration for the Aos message proxy.
//! All other proxy crates depend on this one.

pub mod config;
pub mod wire;

pub use config::{Config, ConfigError};
pub use wire::{FrameHeader, MethodHeader, WireError, MAX_MESSAGE_SIZE};
