// src/state.rs
//! Shared acquisition state: the current fix, satellites and connectivity

use crate::{
    gps::{
        data::{AltitudePolicy, FixMode, GpsFix, GpsUpdate, SatelliteRecord},
        satellites::{SatelliteTable, SweepAssembler},
    },
    status::{ConnectivityMachine, ConnectivityStatus, StatusHook, Transition},
};
use log::info;
use std::sync::{Arc, PoisonError, RwLock};

/// Everything the parsers write and the assembler reads.
#[derive(Debug, Clone)]
pub struct AcquisitionState {
    pub fix: GpsFix,
    pub satellites: SatelliteTable,
    pub policy: AltitudePolicy,
    sweeps: SweepAssembler,
    connectivity: ConnectivityMachine,
}

impl AcquisitionState {
    pub fn new(policy: AltitudePolicy, transport_configured: bool) -> Self {
        let mut fix = GpsFix::new();
        if let Some(fixed) = policy.fixed_altitude {
            fix.altitude = Some(fixed);
            fix.mode = Some(FixMode::Fix2D);
        }
        Self {
            fix,
            satellites: SatelliteTable::new(),
            policy,
            sweeps: SweepAssembler::new(),
            connectivity: ConnectivityMachine::new(transport_configured),
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.connectivity.status()
    }

    /// Apply one structured update and derive the resulting status.
    pub fn apply(&mut self, update: GpsUpdate) -> Option<Transition> {
        let verdict = update.fix_verdict();

        match update {
            GpsUpdate::Position {
                position,
                altitude,
                mode,
                time,
            } => {
                self.fix.position = Some(position);
                self.resolve_altitude(
                    altitude.or(self.fix.altitude),
                    mode.or(Some(FixMode::Fix2D)),
                );
                self.fix.timestamp = time;
            }
            GpsUpdate::NoFix {
                altitude,
                mode,
                time,
            } => {
                self.resolve_altitude(
                    altitude.or(self.fix.altitude),
                    mode.or(Some(FixMode::NoFix)),
                );
                self.fix.timestamp = time;
            }
            GpsUpdate::Altitude { altitude, hdop } => {
                if hdop.is_some() {
                    self.fix.hdop = hdop;
                }
                if altitude.is_some() || self.policy.fixed_altitude.is_some() {
                    self.resolve_altitude(altitude, None);
                }
            }
            GpsUpdate::HdopOnly(hdop) => self.fix.hdop = Some(hdop),
            GpsUpdate::Satellites {
                system,
                part,
                parts,
                records,
                hdop,
            } => {
                if hdop.is_some() {
                    self.fix.hdop = hdop;
                }
                if let Some(sweep) = self.sweeps.push(system, part, parts, records) {
                    self.satellites.replace_system(system, sweep);
                }
            }
        }

        self.connectivity.observe(verdict)
    }

    fn resolve_altitude(&mut self, altitude: Option<f64>, reported: Option<FixMode>) {
        let (mode, altitude) = self.policy.resolve(altitude, reported);
        if mode.is_some() {
            self.fix.mode = mode;
        }
        if altitude.is_some() {
            self.fix.altitude = altitude;
        }
    }
}

/// A consistent copy of the state, taken once per assembly tick.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub fix: GpsFix,
    pub status: ConnectivityStatus,
    pub satellites: Vec<SatelliteRecord>,
    pub policy: AltitudePolicy,
}

/// Cloneable handle to the shared [`AcquisitionState`].
///
/// Status hooks run after the lock is released.
#[derive(Clone)]
pub struct AcquisitionHandle {
    state: Arc<RwLock<AcquisitionState>>,
    hooks: Arc<Vec<Box<dyn StatusHook>>>,
}

impl AcquisitionHandle {
    pub fn new(state: AcquisitionState, hooks: Vec<Box<dyn StatusHook>>) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            hooks: Arc::new(hooks),
        }
    }

    /// Record one line received from `source`, with its decoded update if any.
    pub fn ingest(&self, source: &str, update: Option<GpsUpdate>) {
        let transition = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.connectivity.record_contact() {
                info!("GPS detected {}", source);
            }
            match update {
                Some(update) => state.apply(update),
                None => state.connectivity.observe(None),
            }
        };
        self.fire(transition);
    }

    /// The live transport failed or went stale.
    pub fn transport_failed(&self) {
        let transition = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .connectivity
            .transport_failed();
        self.fire(transition);
    }

    /// The transport was replaced. Drops what the old one reported; status
    /// becomes `off` when none is left, else `inactive`.
    pub fn transport_replaced(&self, transport_configured: bool) {
        let transition = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let fresh = AcquisitionState::new(state.policy, transport_configured);
            state.fix = fresh.fix;
            state.satellites = fresh.satellites;
            state.sweeps = fresh.sweeps;
            state.connectivity.reset(transport_configured)
        };
        self.fire(transition);
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        StateSnapshot {
            fix: state.fix.clone(),
            status: state.status(),
            satellites: state.satellites.flatten().cloned().collect(),
            policy: state.policy,
        }
    }

    fn fire(&self, transition: Option<Transition>) {
        if let Some(transition) = transition {
            for hook in self.hooks.iter() {
                hook.on_transition(transition);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::{gpsd::parse_gpsd_json, nmea::parse_nmea_sentence, GnssSystem};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Transition>>);

    impl StatusHook for Arc<Recorder> {
        fn on_transition(&self, transition: Transition) {
            self.0.lock().unwrap().push(transition);
        }
    }

    fn feed_nmea(state: &mut AcquisitionState, lines: &[&str]) {
        for line in lines {
            if let Some(update) = parse_nmea_sentence(line) {
                state.apply(update);
            }
        }
    }

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230325,003.1,W*6A";
    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn test_gga_upgrades_to_3d() {
        let mut state = AcquisitionState::new(AltitudePolicy::default(), true);
        feed_nmea(&mut state, &[RMC, GGA]);

        assert_eq!(state.fix.mode, Some(FixMode::Fix3D));
        assert_eq!(state.fix.altitude, Some(545.4));
        assert_eq!(state.fix.hdop, Some(0.9));
        assert_eq!(state.status(), ConnectivityStatus::Active);
    }

    #[test]
    fn test_position_without_mode_is_2d() {
        let mut state = AcquisitionState::new(AltitudePolicy::default(), true);
        feed_nmea(&mut state, &[RMC]);

        assert_eq!(state.fix.mode, Some(FixMode::Fix2D));
        assert_eq!(state.fix.altitude, None);
        assert_eq!(state.status(), ConnectivityStatus::Active);
    }

    #[test]
    fn test_fixed_altitude_overrides_receiver() {
        let mut state = AcquisitionState::new(AltitudePolicy::new(Some(160.0)), true);
        feed_nmea(&mut state, &[RMC, GGA]);

        assert_eq!(state.fix.mode, Some(FixMode::Fix2D));
        assert_eq!(state.fix.altitude, Some(160.0));
    }

    #[test]
    fn test_gsv_sweep_replaces_system() {
        let mut state = AcquisitionState::new(AltitudePolicy::default(), true);
        feed_nmea(
            &mut state,
            &[
                "$GPGSV,2,1,05,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45",
                "$GLGSV,1,1,01,65,10,020,30",
                "$GPGSV,2,2,05,20,55,120,38",
            ],
        );
        let gps: Vec<u16> = state
            .satellites
            .system(GnssSystem::Gps)
            .unwrap()
            .iter()
            .map(|s| s.prn)
            .collect();
        assert_eq!(gps, vec![1, 2, 12, 14, 20]);

        // A new sweep replaces GPS only, once complete
        feed_nmea(&mut state, &["$GPGSV,2,1,02,03,40,083,46"]);
        assert_eq!(state.satellites.flatten().count(), 6);
        feed_nmea(&mut state, &["$GPGSV,2,2,02,04,40,083,46"]);

        let prns: Vec<u16> = state.satellites.flatten().map(|s| s.prn).collect();
        // GLONASS completed its sweep first, so it keeps the first slot
        assert_eq!(prns, vec![65, 3, 4]);
    }

    #[test]
    fn test_tpv_uses_cached_altitude() {
        let mut state = AcquisitionState::new(AltitudePolicy::default(), true);
        let with_alt = r#"{"class":"TPV","mode":3,"lat":52.5,"lon":13.4,"alt":35.0}"#;
        let without_alt = r#"{"class":"TPV","mode":2,"lat":52.5,"lon":13.4}"#;

        state.apply(parse_gpsd_json(with_alt).unwrap());
        state.apply(parse_gpsd_json(without_alt).unwrap());

        assert_eq!(state.fix.altitude, Some(35.0));
        assert_eq!(state.fix.mode, Some(FixMode::Fix3D));
    }

    #[test]
    fn test_tpv_no_fix_keeps_altitude_and_drops_mode() {
        let mut state = AcquisitionState::new(AltitudePolicy::default(), true);
        state.apply(parse_gpsd_json(r#"{"class":"TPV","mode":3,"lat":52.5,"lon":13.4,"alt":35.0}"#).unwrap());
        state.apply(parse_gpsd_json(r#"{"class":"TPV","mode":1}"#).unwrap());

        assert_eq!(state.fix.altitude, Some(35.0));
        assert_eq!(state.fix.mode, Some(FixMode::NoFix));
        assert_eq!(state.status(), ConnectivityStatus::Inactive);
    }

    #[test]
    fn test_handle_fires_hooks_once_per_edge() {
        let recorder = Arc::new(Recorder::default());
        let handle = AcquisitionHandle::new(
            AcquisitionState::new(AltitudePolicy::default(), true),
            vec![Box::new(Arc::clone(&recorder)) as Box<dyn StatusHook>],
        );

        handle.ingest("test receiver", parse_nmea_sentence(RMC));
        handle.ingest("test receiver", parse_nmea_sentence(RMC));
        handle.ingest("test receiver", parse_nmea_sentence(GGA));
        handle.transport_failed();
        handle.ingest("test receiver", None);

        let seen: Vec<ConnectivityStatus> =
            recorder.0.lock().unwrap().iter().map(|t| t.to).collect();
        assert_eq!(
            seen,
            vec![
                ConnectivityStatus::Active,
                ConnectivityStatus::Error,
                ConnectivityStatus::Inactive,
            ]
        );
    }

    #[test]
    fn test_transport_replaced_clears_fix() {
        let handle = AcquisitionHandle::new(
            AcquisitionState::new(AltitudePolicy::new(Some(160.0)), true),
            vec![],
        );
        handle.ingest("test receiver", parse_nmea_sentence(RMC));
        handle.ingest("test receiver", parse_nmea_sentence("$GPGSV,1,1,01,05,45,100,35"));
        assert_eq!(handle.status(), ConnectivityStatus::Active);

        handle.transport_replaced(false);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, ConnectivityStatus::Off);
        assert!(snapshot.fix.position.is_none());
        assert!(snapshot.satellites.is_empty());
        assert_eq!(snapshot.fix.altitude, Some(160.0));
    }
}
