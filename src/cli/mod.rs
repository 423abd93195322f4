//! CLI frontend over the session command/event bus.

pub mod actions;

pub use actions::*;
