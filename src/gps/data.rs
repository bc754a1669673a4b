// src/gps/data.rs
//! GPS data structures shared by both wire parsers

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Satellite system a satellite block was reported under.
///
/// NMEA receivers tag every sentence with a talker ID; gpsd flattens all
/// constellations into a single `SKY` list which is kept under [`GnssSystem::Gpsd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GnssSystem {
    Gps,
    Glonass,
    Galileo,
    BeiDou,
    Gnss,
    Gpsd,
}

impl GnssSystem {
    /// Map an NMEA talker ID (`GP`, `GL`, ...) to a system, defaulting to GPS.
    pub fn from_talker(talker: &str) -> Self {
        match talker {
            "GP" => GnssSystem::Gps,
            "GL" => GnssSystem::Glonass,
            "GA" => GnssSystem::Galileo,
            "BD" | "GB" => GnssSystem::BeiDou,
            "GN" => GnssSystem::Gnss,
            _ => GnssSystem::Gps,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GnssSystem::Gps => "GPS",
            GnssSystem::Glonass => "GLONASS",
            GnssSystem::Galileo => "Galileo",
            GnssSystem::BeiDou => "BeiDou",
            GnssSystem::Gnss => "GNSS",
            GnssSystem::Gpsd => "GPSD",
        }
    }
}

impl fmt::Display for GnssSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for GnssSystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// One satellite in view, as published to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteRecord {
    pub prn: u16,
    #[serde(rename = "el")]
    pub elevation: i16,
    #[serde(rename = "az")]
    pub azimuth: i16,
    pub snr: u16,
    #[serde(rename = "sys")]
    pub system: GnssSystem,
}

/// Positional solution quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    NoFix,
    Fix2D,
    Fix3D,
}

impl FixMode {
    /// Interpret a gpsd `mode` value (0 = unknown, 1 = no fix, 2 = 2D, 3 = 3D).
    pub fn from_gpsd(mode: u64) -> Self {
        match mode {
            2 => FixMode::Fix2D,
            m if m >= 3 => FixMode::Fix3D,
            _ => FixMode::NoFix,
        }
    }

    pub fn has_fix(&self) -> bool {
        !matches!(self, FixMode::NoFix)
    }

    /// Wire representation: `"2"`, `"3"`, or empty when there is no fix.
    pub fn as_wire(&self) -> &'static str {
        match self {
            FixMode::NoFix => "",
            FixMode::Fix2D => "2",
            FixMode::Fix3D => "3",
        }
    }
}

/// Latitude and longitude in signed decimal degrees, always set as a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// The current fix, continuously overwritten by whichever transport is live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsFix {
    pub position: Option<Position>,
    pub altitude: Option<f64>,
    pub mode: Option<FixMode>,
    pub hdop: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl GpsFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.position.map(|p| p.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.position.map(|p| p.longitude)
    }
}

/// One structured update decoded from a single wire line.
///
/// Both the NMEA and the gpsd parsers produce this shape, so everything
/// downstream of the parsers is protocol agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsUpdate {
    /// A valid position (RMC with status `A`, or TPV with mode >= 2 and coordinates).
    Position {
        position: Position,
        altitude: Option<f64>,
        mode: Option<FixMode>,
        time: Option<DateTime<Utc>>,
    },
    /// The receiver explicitly reported that it has no fix.
    NoFix {
        altitude: Option<f64>,
        mode: Option<FixMode>,
        time: Option<DateTime<Utc>>,
    },
    /// GGA: altitude and HDOP, without touching fix validity.
    Altitude {
        altitude: Option<f64>,
        hdop: Option<f64>,
    },
    /// GSA or a SKY report carrying nothing but HDOP.
    HdopOnly(f64),
    /// One part of a satellite sweep for a single system.
    Satellites {
        system: GnssSystem,
        part: u8,
        parts: u8,
        records: Vec<SatelliteRecord>,
        hdop: Option<f64>,
    },
}

impl GpsUpdate {
    /// Whether this update says anything about fix validity.
    pub fn fix_verdict(&self) -> Option<bool> {
        match self {
            GpsUpdate::Position { .. } => Some(true),
            GpsUpdate::NoFix { .. } => Some(false),
            _ => None,
        }
    }
}

/// Altitude and fix mode precedence: configured fixed altitude, then a
/// receiver altitude, then whatever mode the receiver reported.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AltitudePolicy {
    pub fixed_altitude: Option<f64>,
}

impl AltitudePolicy {
    pub fn new(fixed_altitude: Option<f64>) -> Self {
        Self { fixed_altitude }
    }

    /// Resolve the mode and altitude to record.
    ///
    /// `altitude` is the freshest altitude known (a new reading, else the cached one).
    /// A reported no-fix is never upgraded by a receiver altitude.
    pub fn resolve(
        &self,
        altitude: Option<f64>,
        reported: Option<FixMode>,
    ) -> (Option<FixMode>, Option<f64>) {
        if let Some(fixed) = self.fixed_altitude {
            return (Some(FixMode::Fix2D), Some(fixed));
        }
        match (reported, altitude) {
            (Some(FixMode::NoFix), alt) => (Some(FixMode::NoFix), alt),
            (_, Some(alt)) => (Some(FixMode::Fix3D), Some(alt)),
            (reported, None) => (reported, None),
        }
    }
}
