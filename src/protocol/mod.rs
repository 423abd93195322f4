//! The device session protocol engine: line framing, response
//! classification, pending-request correlation and the connection worker.

pub mod battery;
pub mod classify;
pub mod command;
pub mod framing;
pub mod pending;
pub mod runtime;
pub mod session;
