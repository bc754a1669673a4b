// src/gps/gpsd.rs
//! gpsd JSON watch protocol: connection setup and line decoding

use super::data::{FixMode, GnssSystem, GpsUpdate, Position, SatelliteRecord};
use crate::error::{GpsError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

/// Enables the JSON report stream on a fresh gpsd connection.
pub const WATCH_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true};\n";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: Map<String, Value>,
}

/// Connect to a gpsd daemon and enable the JSON watch stream
pub async fn connect_gpsd(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| GpsError::Connection(format!("Timed out connecting to gpsd at {}", addr)))?
        .map_err(|e| {
            GpsError::Connection(format!("Failed to connect to gpsd at {}: {}", addr, e))
        })?;

    stream.set_nodelay(true)?;
    stream
        .write_all(WATCH_COMMAND.as_bytes())
        .await
        .map_err(|e| GpsError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(stream)
}

/// Parse a single line of gpsd JSON data.
///
/// gpsd interleaves banners and other classes with reports, so anything
/// that is not a well formed `TPV` or `SKY` object is dropped.
pub fn parse_gpsd_json(line: &str) -> Option<GpsUpdate> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }

    let msg: GpsdMessage = serde_json::from_str(line).ok()?;

    match msg.class.as_str() {
        "TPV" => Some(parse_tpv_message(&msg.data)),
        "SKY" => parse_sky_message(&msg.data),
        "VERSION" => {
            if let Some(release) = msg.data.get("release").and_then(Value::as_str) {
                debug!("gpsd version {}", release);
            }
            None
        }
        "DEVICES" => {
            if let Some(devices) = msg.data.get("devices").and_then(Value::as_array) {
                debug!("gpsd managing {} device(s)", devices.len());
            }
            None
        }
        _ => None,
    }
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(data: &Map<String, Value>) -> GpsUpdate {
    let mode = FixMode::from_gpsd(data.get("mode").and_then(Value::as_u64).unwrap_or(0));
    let latitude = data.get("lat").and_then(Value::as_f64);
    let longitude = data.get("lon").and_then(Value::as_f64);
    let altitude = data.get("alt").and_then(Value::as_f64);
    let time = data
        .get("time")
        .and_then(Value::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    match (mode.has_fix(), latitude, longitude) {
        (true, Some(latitude), Some(longitude)) => GpsUpdate::Position {
            position: Position { latitude, longitude },
            altitude,
            mode: Some(mode),
            time,
        },
        _ => GpsUpdate::NoFix {
            altitude,
            mode: Some(mode),
            time,
        },
    }
}

/// Parse SKY (satellite data) message
fn parse_sky_message(data: &Map<String, Value>) -> Option<GpsUpdate> {
    let hdop = data.get("hdop").and_then(Value::as_f64);

    let Some(satellites) = data.get("satellites").and_then(Value::as_array) else {
        return hdop.map(GpsUpdate::HdopOnly);
    };

    let records = satellites
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|sat| {
            let prn = sat.get("PRN").and_then(Value::as_u64)?;
            let elevation = sat.get("el").and_then(Value::as_f64)?;
            let azimuth = sat.get("az").and_then(Value::as_f64)?;
            let snr = sat.get("ss").and_then(Value::as_f64).unwrap_or(0.0);
            Some(SatelliteRecord {
                prn: prn as u16,
                elevation: elevation.round() as i16,
                azimuth: azimuth.round() as i16,
                snr: snr.max(0.0).round() as u16,
                system: GnssSystem::Gpsd,
            })
        })
        .collect();

    Some(GpsUpdate::Satellites {
        system: GnssSystem::Gpsd,
        part: 1,
        parts: 1,
        records,
        hdop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpv_parsing() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2023-01-01T12:00:00.000Z","ept":0.005,"lat":48.117,"lon":11.517,"alt":545.4,"epx":15.319,"epy":17.054,"epv":124.484,"track":10.3797,"speed":0.091,"climb":10.7,"eps":34.11,"epc":248.97}"#;

        match parse_gpsd_json(json) {
            Some(GpsUpdate::Position { position, altitude, mode, time }) => {
                assert_eq!(position.latitude, 48.117);
                assert_eq!(position.longitude, 11.517);
                assert_eq!(altitude, Some(545.4));
                assert_eq!(mode, Some(FixMode::Fix3D));
                assert_eq!(time.unwrap().to_rfc3339(), "2023-01-01T12:00:00+00:00");
            }
            other => panic!("expected a position, got {:?}", other),
        }
    }

    #[test]
    fn test_tpv_without_fix() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1,"lat":48.117,"lon":11.517}"#;
        assert!(matches!(
            parse_gpsd_json(json),
            Some(GpsUpdate::NoFix { mode: Some(FixMode::NoFix), .. })
        ));

        // Mode 2 but a coordinate is missing
        let json = r#"{"class":"TPV","mode":2,"lat":48.117}"#;
        assert!(matches!(parse_gpsd_json(json), Some(GpsUpdate::NoFix { .. })));

        // Coordinates present but not numeric
        let json = r#"{"class":"TPV","mode":3,"lat":"48.117","lon":"11.517"}"#;
        assert!(matches!(parse_gpsd_json(json), Some(GpsUpdate::NoFix { .. })));
    }

    #[test]
    fn test_sky_parsing() {
        let json = r#"{"class":"SKY","device":"/dev/ttyUSB0","time":"2023-01-01T12:00:00.000Z","hdop":1.2,"satellites":[{"PRN":1,"el":40,"az":83.4,"ss":42,"used":true},{"PRN":2,"el":17,"az":308,"used":true},{"PRN":3,"ss":30}]}"#;

        match parse_gpsd_json(json) {
            Some(GpsUpdate::Satellites { system, records, hdop, part, parts }) => {
                assert_eq!(system, GnssSystem::Gpsd);
                assert_eq!((part, parts), (1, 1));
                assert_eq!(hdop, Some(1.2));
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].azimuth, 83);
                assert_eq!(records[0].snr, 42);
                assert_eq!(records[1].snr, 0);
            }
            other => panic!("expected satellites, got {:?}", other),
        }
    }

    #[test]
    fn test_sky_hdop_only() {
        let json = r#"{"class":"SKY","hdop":0.8}"#;
        assert_eq!(parse_gpsd_json(json), Some(GpsUpdate::HdopOnly(0.8)));
    }

    #[test]
    fn test_ignored_lines() {
        assert_eq!(parse_gpsd_json(r#"{"invalid": json"#), None);
        assert_eq!(parse_gpsd_json("GPSD banner, not JSON"), None);
        assert_eq!(parse_gpsd_json(r#"{"class":"VERSION","release":"3.25"}"#), None);
        assert_eq!(parse_gpsd_json(r#"{"class":"WATCH","enable":true}"#), None);
        assert_eq!(parse_gpsd_json(r#"{"no_class":1}"#), None);
    }

    #[test]
    fn test_watch_command() {
        assert!(WATCH_COMMAND.ends_with(";\n"));
        assert!(WATCH_COMMAND.starts_with("?WATCH="));
    }
}
