// src/assembler.rs
//! Builds the published sample from the shared state once per tick

use crate::{
    error::{GpsError, Result},
    gps::data::{Position, SatelliteRecord},
    state::{AcquisitionHandle, StateSnapshot},
    status::ConnectivityStatus,
};
use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use std::{io::Write, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

pub const TICK: Duration = Duration::from_secs(1);

/// One normalized sample. Numbers are pre-formatted strings, empty when unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsSample {
    pub status: ConnectivityStatus,
    pub time: String,
    pub lat: String,
    pub lon: String,
    pub alt: String,
    pub mode: String,
    pub hdop: Option<f64>,
    pub satellites: Vec<SatelliteRecord>,
}

/// `{"type":"GPS","value":{...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: GpsSample,
}

impl PublishMessage {
    pub fn gps(value: GpsSample) -> Self {
        Self { kind: "GPS", value }
    }
}

/// Build a sample from a snapshot.
///
/// `station` stands in for the position when no transport is configured;
/// `now` stands in for a missing receiver time.
pub fn assemble(
    snapshot: &StateSnapshot,
    station: Option<Position>,
    now: DateTime<Utc>,
) -> GpsSample {
    let fix = &snapshot.fix;

    let position = match (fix.position, snapshot.status) {
        (Some(position), _) => Some(position),
        (None, ConnectivityStatus::Off) => station,
        (None, _) => None,
    };

    let (mode, altitude) = snapshot.policy.resolve(fix.altitude, fix.mode);
    let mode = if snapshot.status == ConnectivityStatus::Active {
        mode.map(|m| m.as_wire()).unwrap_or("")
    } else if altitude.is_some() {
        "2"
    } else {
        ""
    };

    GpsSample {
        status: snapshot.status,
        time: format_time(fix.timestamp.unwrap_or(now)),
        lat: position.map(|p| format!("{:.9}", p.latitude)).unwrap_or_default(),
        lon: position.map(|p| format!("{:.9}", p.longitude)).unwrap_or_default(),
        alt: altitude.map(|a| format!("{:.3}", a)).unwrap_or_default(),
        mode: mode.to_string(),
        hdop: fix.hdop,
        satellites: snapshot.satellites.clone(),
    }
}

/// ISO-8601 with the millisecond field forced to `.000Z`.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

/// Downstream sink for assembled samples.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: &PublishMessage) -> Result<()>;
}

/// Writes one JSON line per sample to stdout.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(&self, message: &PublishMessage) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, message)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Hands samples to an in-process consumer; a full or closed channel drops the sample.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<PublishMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, message: &PublishMessage) -> Result<()> {
        self.tx
            .try_send(message.clone())
            .map_err(|e| GpsError::Publish(e.to_string()))
    }
}

/// Periodic sample producer.
pub struct SampleAssembler {
    handle: AcquisitionHandle,
    station: Option<Position>,
    publisher: Arc<dyn Publisher>,
}

impl SampleAssembler {
    pub fn new(
        handle: AcquisitionHandle,
        station: Option<Position>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            handle,
            station,
            publisher,
        }
    }

    pub fn sample(&self) -> GpsSample {
        assemble(&self.handle.snapshot(), self.station, Utc::now())
    }

    /// Assemble and publish one sample; a publish failure only drops this tick.
    pub fn tick(&self) {
        let message = PublishMessage::gps(self.sample());
        if let Err(e) = self.publisher.publish(&message) {
            warn!("GPS sample not published: {}", e);
        }
    }

    /// Run [`tick`](Self::tick) every `period` until the task is aborted.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}
