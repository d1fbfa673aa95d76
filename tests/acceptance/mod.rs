//! End-to-end probe runs against the simulated radio.

mod common;
mod config_test;
mod pacing_test;
