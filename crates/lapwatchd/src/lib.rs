//! Lapwatch daemon library - exposes modules for testing.

pub mod client;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod transform;
