// src/gps/mod.rs
//! GPS data handling and parsing

pub mod data;
pub mod gpsd;
pub mod nmea;
pub mod satellites;

pub use data::{AltitudePolicy, FixMode, GnssSystem, GpsFix, GpsUpdate, Position, SatelliteRecord};
pub use satellites::SatelliteTable;
