// src/gps/nmea.rs
//! NMEA-0183 sentence parsing

use super::data::{GnssSystem, GpsUpdate, Position, SatelliteRecord};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse a single NMEA sentence into a structured update.
///
/// Unknown sentence types and malformed lines yield `None`.
pub fn parse_nmea_sentence(line: &str) -> Option<GpsUpdate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Drop the checksum suffix
    let content = line.split('*').next().unwrap_or(line);
    let parts: Vec<&str> = content.split(',').collect();
    let header = parts[0].trim();

    let sentence = sentence_type(header)?;
    let system = talker_system(header);

    match sentence {
        "RMC" => parse_rmc(&parts),
        "GGA" => parse_gga(&parts),
        "GSA" => parse_gsa(&parts),
        "GSV" => parse_gsv(&parts, system),
        _ => None,
    }
}

/// `$GPRMC` => `RMC`
fn sentence_type(header: &str) -> Option<&str> {
    if !header.starts_with('$') {
        return None;
    }
    header.get(3..6)
}

fn talker_system(header: &str) -> GnssSystem {
    header
        .get(1..3)
        .map(GnssSystem::from_talker)
        .unwrap_or(GnssSystem::Gps)
}

/// Parse RMC (Recommended Minimum) sentence
fn parse_rmc(parts: &[&str]) -> Option<GpsUpdate> {
    if parts.len() < 10 {
        return None;
    }

    let time = parts[1];
    let status = parts[2];
    let (latitude, lat_dir) = (parts[3], parts[4]);
    let (longitude, lon_dir) = (parts[5], parts[6]);
    let date = parts[9];

    if status != "A"
        || latitude.is_empty()
        || lat_dir.is_empty()
        || longitude.is_empty()
        || lon_dir.is_empty()
    {
        return Some(GpsUpdate::NoFix {
            altitude: None,
            mode: None,
            time: None,
        });
    }

    let mut lat = degrees_minutes(latitude, 2)?;
    let mut lon = degrees_minutes(longitude, 3)?;
    if lat_dir == "S" {
        lat = -lat;
    }
    if lon_dir == "W" {
        lon = -lon;
    }

    Some(GpsUpdate::Position {
        position: Position {
            latitude: lat,
            longitude: lon,
        },
        altitude: None,
        mode: None,
        time: rmc_timestamp(date, time),
    })
}

/// Convert `ddmm.mmmm` (or `dddmm.mmmm`) to decimal degrees.
fn degrees_minutes(field: &str, degree_digits: usize) -> Option<f64> {
    let degrees: f64 = field.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = field.get(degree_digits..)?.parse().ok()?;
    Some(degrees + minutes / 60.0)
}

/// Combine RMC `ddmmyy` and `hhmmss[.ss]` into a UTC instant.
fn rmc_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    if date.len() < 6 || time.len() < 6 {
        return None;
    }
    let field = |s: &str, range: std::ops::Range<usize>| -> Option<u32> {
        s.get(range)?.parse().ok()
    };

    let day = field(date, 0..2)?;
    let month = field(date, 2..4)?;
    let year = 2000 + field(date, 4..6)? as i32;
    let hour = field(time, 0..2)?;
    let minute = field(time, 2..4)?;
    let second = field(time, 4..6)?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Parse GGA (Fix Data) sentence: HDOP at field 8, altitude at field 9
fn parse_gga(parts: &[&str]) -> Option<GpsUpdate> {
    if parts.len() < 10 {
        return None;
    }

    let hdop = parts[8].trim().parse::<f64>().ok();
    let altitude = parts[9].trim().parse::<f64>().ok();

    if hdop.is_none() && altitude.is_none() {
        return None;
    }
    Some(GpsUpdate::Altitude { altitude, hdop })
}

/// Parse GSA (DOP and active satellites) sentence: HDOP at field 16
fn parse_gsa(parts: &[&str]) -> Option<GpsUpdate> {
    if parts.len() < 17 {
        return None;
    }
    parts[16].trim().parse::<f64>().ok().map(GpsUpdate::HdopOnly)
}

/// Parse GSV (Satellites in View) sentence
///
/// `$xxGSV,<parts>,<part>,<in view>,{PRN,elevation,azimuth,SNR} x 1..4`
fn parse_gsv(parts: &[&str], system: GnssSystem) -> Option<GpsUpdate> {
    if parts.len() < 4 {
        return None;
    }

    let total = parts[1].trim().parse::<u8>().ok()?;
    let part = parts[2].trim().parse::<u8>().ok()?;

    let mut records = Vec::new();
    let mut blocks = 0;
    let mut index = 4;
    while index + 3 < parts.len() {
        let block = &parts[index..index + 4];
        index += 4;

        if block.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        blocks += 1;

        let prn = block[0].trim().parse::<u16>();
        let elevation = block[1].trim().parse::<i16>();
        let azimuth = block[2].trim().parse::<i16>();
        if let (Ok(prn), Ok(elevation), Ok(azimuth)) = (prn, elevation, azimuth) {
            records.push(SatelliteRecord {
                prn,
                elevation,
                azimuth,
                snr: block[3].trim().parse::<u16>().unwrap_or(0),
                system,
            });
        }
    }

    // Every block on the line was garbage
    if blocks > 0 && records.is_empty() {
        return None;
    }

    Some(GpsUpdate::Satellites {
        system,
        part,
        parts: total,
        records,
        hdop: None,
    })
}
