//! Lapwatch common library - shared types for the timing exporter.

pub mod config;
pub mod drivers;
pub mod records;

pub use config::{ConfigError, ExporterConfig, PollingConfig, UpstreamConfig};
pub use drivers::{DirectoryError, DriverDirectory};
pub use records::{
    DriverNumber, Field, IntervalRecord, LapRecord, PositionRecord, SessionDescriptor,
    SessionType, DEFAULT_DRIVER_NUMBER,
};

/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
