// src/transport/simulation.rs
//! Synthetic receiver for development without hardware

use super::{lock, Supervisor};
use crate::{
    config::SimulationConfig,
    gps::data::{FixMode, GnssSystem, GpsUpdate, Position, SatelliteRecord},
    state::AcquisitionHandle,
};
use chrono::Utc;
use log::info;
use rand::Rng;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{task::JoinHandle, time::interval};

pub const TICK: Duration = Duration::from_secs(1);

const SOURCE: &str = "GPS simulator";

pub struct SimulationSupervisor {
    reference: SimulationConfig,
    handle: AcquisitionHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationSupervisor {
    pub fn new(reference: SimulationConfig, handle: AcquisitionHandle) -> Arc<Self> {
        Arc::new(Self {
            reference,
            handle,
            task: Mutex::new(None),
        })
    }

    /// Synthesize and ingest one fix.
    pub fn tick(&self) {
        for update in synthesize(&self.reference, &mut rand::thread_rng()) {
            self.handle.ingest(SOURCE, Some(update));
        }
    }
}

/// A fix near the reference point plus a fixed demo sky.
pub fn synthesize(reference: &SimulationConfig, rng: &mut impl Rng) -> Vec<GpsUpdate> {
    let position = Position {
        latitude: reference.latitude + rng.gen_range(-0.0005..0.0005),
        longitude: reference.longitude + rng.gen_range(-0.0005..0.0005),
    };
    let altitude = reference.altitude + rng.gen_range(-2.5..2.5);

    let sat = |prn, elevation, azimuth, snr| SatelliteRecord {
        prn,
        elevation,
        azimuth,
        snr,
        system: GnssSystem::Gps,
    };

    vec![
        GpsUpdate::Position {
            position,
            altitude: Some(altitude),
            mode: Some(FixMode::Fix3D),
            time: Some(Utc::now()),
        },
        GpsUpdate::Satellites {
            system: GnssSystem::Gps,
            part: 1,
            parts: 1,
            records: vec![sat(5, 45, 100, 35), sat(12, 80, 180, 42), sat(24, 15, 270, 15)],
            hdop: Some(1.2),
        },
    ]
}

impl Supervisor for SimulationSupervisor {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn start(self: Arc<Self>, force: bool) {
        let mut task = lock(&self.task);
        if let Some(running) = task.as_ref() {
            if !force && !running.is_finished() {
                return;
            }
            running.abort();
        }

        info!("GPS simulation mode enabled");
        let this = Arc::clone(&self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(TICK);
            loop {
                ticker.tick().await;
                this.tick();
            }
        }));
    }

    fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }

    fn check_health(self: Arc<Self>) {
        let finished = lock(&self.task)
            .as_ref()
            .map_or(false, |task| task.is_finished());
        if finished {
            self.start(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gps::data::AltitudePolicy, state::AcquisitionState, status::ConnectivityStatus};

    #[test]
    fn test_synthesized_fix_stays_near_reference() {
        let reference = SimulationConfig::default();
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            match &synthesize(&reference, &mut rng)[0] {
                GpsUpdate::Position { position, altitude, .. } => {
                    assert!((position.latitude - reference.latitude).abs() <= 0.0005);
                    assert!((position.longitude - reference.longitude).abs() <= 0.0005);
                    assert!((altitude.unwrap() - reference.altitude).abs() <= 2.5);
                }
                other => panic!("expected a position, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_tick_activates_state() {
        let handle =
            AcquisitionHandle::new(AcquisitionState::new(AltitudePolicy::default(), true), vec![]);
        let simulator = SimulationSupervisor::new(SimulationConfig::default(), handle.clone());

        simulator.tick();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, ConnectivityStatus::Active);
        assert_eq!(snapshot.satellites.len(), 3);
        assert_eq!(snapshot.fix.hdop, Some(1.2));
        assert_eq!(snapshot.fix.mode, Some(FixMode::Fix3D));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ticker() {
        let handle =
            AcquisitionHandle::new(AcquisitionState::new(AltitudePolicy::default(), true), vec![]);
        let simulator = SimulationSupervisor::new(SimulationConfig::default(), handle.clone());

        Arc::clone(&simulator).start(false);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(handle.status(), ConnectivityStatus::Active);

        simulator.stop();
        assert!(lock(&simulator.task).is_none());
    }
}
