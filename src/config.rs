// src/config.rs
//! Configuration file handling

use crate::{
    error::{GpsError, Result},
    gps::data::Position,
    map_update::StationIdentity,
    monitor::GpsSource,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Map directory updates are never sent more often than this.
pub const MIN_MAP_UPDATE_INTERVAL: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Empty for no receiver, `"gpsd"`, `"simulate"`, or a serial device path
    pub source: String,
    pub baudrate: u32,
    /// Fixed altitude in meters; overrides the receiver altitude and forces 2D mode
    #[serde(deserialize_with = "lenient_altitude")]
    pub fixed_altitude: Option<f64>,
    pub gpsd_host: String,
    pub gpsd_port: u16,
    pub update_map_pos: bool,
    /// Seconds between map directory updates
    pub update_map_interval: u64,
    pub beep_control: bool,
    /// Published when no receiver is configured
    pub station_latitude: Option<f64>,
    pub station_longitude: Option<f64>,
    /// Sent with map directory updates
    pub identity: StationIdentity,
    pub simulation: SimulationConfig,
}

/// Reference point of the simulated receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latitude: 52.520008,
            longitude: 13.404954,
            altitude: 35.0,
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            baudrate: 4800,
            fixed_altitude: None,
            gpsd_host: "127.0.0.1".to_string(),
            gpsd_port: 2947,
            update_map_pos: false,
            update_map_interval: 60,
            beep_control: false,
            station_latitude: None,
            station_longitude: None,
            identity: StationIdentity::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Accepts `160`, `"160"`, `""` or `null`.
fn lenient_altitude<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Altitude {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Altitude>::deserialize(deserializer)? {
        Some(Altitude::Number(value)) => Some(value),
        Some(Altitude::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

impl GpsConfig {
    /// Load configuration from `path`, writing the merged defaults back so
    /// the file always lists every option.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            log::info!("GPS configuration not found. Creating {}", path.display());
            Self::default()
        };
        config.save_to_file(path)?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GpsError::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| GpsError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GpsError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| GpsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("gps-feed").join("config.json"))
    }

    /// The transport selected by `source`.
    pub fn transport(&self) -> GpsSource {
        match self.source.trim() {
            "" => GpsSource::None,
            "gpsd" => GpsSource::Gpsd {
                host: self.gpsd_host.clone(),
                port: self.gpsd_port,
            },
            "simulate" => GpsSource::Simulation(self.simulation.clone()),
            port => GpsSource::Serial {
                port: port.to_string(),
                baudrate: if self.baudrate == 0 { 4800 } else { self.baudrate },
            },
        }
    }

    /// Fallback coordinates, only when both are set.
    pub fn station_position(&self) -> Option<Position> {
        Some(Position {
            latitude: self.station_latitude?,
            longitude: self.station_longitude?,
        })
    }

    pub fn map_update_interval(&self) -> u64 {
        self.update_map_interval.max(MIN_MAP_UPDATE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GpsConfig::default();
        assert_eq!(config.transport(), GpsSource::None);
        assert_eq!(config.baudrate, 4800);
        assert_eq!(config.gpsd_port, 2947);
    }

    #[test]
    fn test_partial_file_merges_defaults() {
        let config: GpsConfig =
            serde_json::from_str(r#"{"source":"gpsd","fixed_altitude":"160"}"#).unwrap();

        assert_eq!(
            config.transport(),
            GpsSource::Gpsd {
                host: "127.0.0.1".to_string(),
                port: 2947
            }
        );
        assert_eq!(config.fixed_altitude, Some(160.0));
        assert_eq!(config.update_map_interval, 60);
    }

    #[test]
    fn test_lenient_altitude() {
        let parse = |json: &str| serde_json::from_str::<GpsConfig>(json).unwrap().fixed_altitude;
        assert_eq!(parse(r#"{"fixed_altitude":""}"#), None);
        assert_eq!(parse(r#"{"fixed_altitude":null}"#), None);
        assert_eq!(parse(r#"{"fixed_altitude":42.5}"#), Some(42.5));
        assert_eq!(parse(r#"{"fixed_altitude":" 7 "}"#), Some(7.0));
    }

    #[test]
    fn test_serial_source() {
        let config = GpsConfig {
            source: "/dev/ttyUSB0".to_string(),
            baudrate: 115200,
            ..GpsConfig::default()
        };
        assert_eq!(
            config.transport(),
            GpsSource::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baudrate: 115200
            }
        );
    }

    #[test]
    fn test_station_position_needs_both() {
        let mut config = GpsConfig::default();
        config.station_latitude = Some(50.0);
        assert_eq!(config.station_position(), None);

        config.station_longitude = Some(8.25);
        assert_eq!(
            config.station_position(),
            Some(Position {
                latitude: 50.0,
                longitude: 8.25
            })
        );
    }

    #[test]
    fn test_map_interval_floor() {
        let mut config = GpsConfig::default();
        config.update_map_interval = 5;
        assert_eq!(config.map_update_interval(), MIN_MAP_UPDATE_INTERVAL);
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = std::env::temp_dir().join(format!("gps-feed-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let _ = std::fs::remove_dir_all(&dir);

        let created = GpsConfig::load_or_create(&path).unwrap();
        assert_eq!(created, GpsConfig::default());
        assert!(path.exists());

        let mut edited = created;
        edited.source = "gpsd".to_string();
        edited.gpsd_host = "gps.local".to_string();
        edited.gpsd_port = 2948;
        edited.save_to_file(&path).unwrap();
        assert_eq!(GpsConfig::load_or_create(&path).unwrap(), edited);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
