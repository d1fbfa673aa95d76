#![doc = "Probe loop and real-time setup for the timed command probe."]

pub mod probe;
pub mod realtime;

pub use probe::*;
pub use realtime::*;
