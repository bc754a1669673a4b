// src/lib.rs
//! GPS Feed Library
//!
//! Acquires position, altitude, fix mode, HDOP and satellites in view from a
//! serial NMEA receiver, a gpsd daemon or a built-in simulator, and turns them
//! into one normalized sample per second.

pub mod assembler;
pub mod config;
pub mod error;
pub mod gps;
pub mod map_update;
pub mod monitor;
pub mod state;
pub mod status;
pub mod transport;

// Re-export main types for convenience
pub use assembler::{ChannelPublisher, GpsSample, PublishMessage, Publisher, StdoutPublisher};
pub use config::GpsConfig;
pub use error::{GpsError, Result};
pub use monitor::{GpsMonitor, GpsSource, ShutdownSignal};
pub use state::{AcquisitionHandle, AcquisitionState};
pub use status::{ConnectivityStatus, LogAlerts, StatusHook, TerminalBell};
