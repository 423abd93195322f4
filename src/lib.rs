//! Serial configuration and provisioning tool for ESP32-class audio
//! devices.
//!
//! The library owns a single exclusive serial session per device: it turns
//! the raw chunked byte stream into protocol lines, classifies them against
//! the device's command/response grammar, and drives the config-mode state
//! machine with correlated request tracking and a background battery
//! poller. The CLI in `main.rs` is a thin frontend over the session
//! command/event bus; any other frontend can drive the same bus.

pub mod core;
pub mod protocol;
pub mod utils;

#[doc(hidden)]
pub mod cli;

pub use crate::core::{
    bus::{SessionCommand, SessionEvent, StatusSeverity},
    error::SessionError,
};
pub use protocol::{
    runtime::{SessionHandle, Transport, SERIAL_BAUD},
    session::DeviceConfig,
};
