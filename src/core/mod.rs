//! Frontend-facing surface: the command/event bus and the error taxonomy.

pub mod bus;
pub mod error;
