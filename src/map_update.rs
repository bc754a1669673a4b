// src/map_update.rs
//! Periodic station registration with an external map directory

use crate::{
    config::GpsConfig,
    error::Result,
    state::{AcquisitionHandle, StateSnapshot},
    status::ConnectivityStatus,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// Static fields sent along with every registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationIdentity {
    pub name: String,
    pub description: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationPayload {
    /// Latitude and longitude rounded to 6 fractional digits
    pub coords: [String; 2],
    pub name: String,
    pub desc: String,
    pub contact: String,
    pub os: String,
    pub version: &'static str,
}

impl RegistrationPayload {
    pub fn new(latitude: f64, longitude: f64, identity: &StationIdentity) -> Self {
        Self {
            coords: [format!("{:.6}", latitude), format!("{:.6}", longitude)],
            name: identity.name.clone(),
            desc: identity.description.clone(),
            contact: identity.contact.clone(),
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Outward call that publishes the station position.
pub trait DirectoryRegistrar: Send + Sync {
    fn register(&self, payload: &RegistrationPayload) -> Result<()>;
}

/// Registrar that only records the update in the log.
#[derive(Debug, Default)]
pub struct LogRegistrar;

impl LogRegistrar {
    fn describe(payload: &RegistrationPayload) -> String {
        format!(
            "GPS map directory update not sent, logged only: {} {}",
            payload.coords[0], payload.coords[1]
        )
    }
}

impl DirectoryRegistrar for LogRegistrar {
    fn register(&self, payload: &RegistrationPayload) -> Result<()> {
        info!("{}", Self::describe(payload));
        Ok(())
    }
}

pub struct MapUpdater {
    handle: AcquisitionHandle,
    enabled: bool,
    period: Duration,
    identity: StationIdentity,
    registrar: Arc<dyn DirectoryRegistrar>,
}

impl MapUpdater {
    pub fn new(
        config: &GpsConfig,
        handle: AcquisitionHandle,
        registrar: Arc<dyn DirectoryRegistrar>,
    ) -> Self {
        Self {
            handle,
            enabled: config.update_map_pos,
            period: Duration::from_secs(config.map_update_interval()),
            identity: config.identity.clone(),
            registrar,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The payload to send for `snapshot`, if one should be sent at all.
    pub fn payload(&self, snapshot: &StateSnapshot) -> Option<RegistrationPayload> {
        if !self.enabled || snapshot.status != ConnectivityStatus::Active {
            return None;
        }
        let position = snapshot.fix.position?;
        Some(RegistrationPayload::new(
            position.latitude,
            position.longitude,
            &self.identity,
        ))
    }

    /// Register once if the fix is active. Returns whether a call was made.
    pub fn tick(&self) -> bool {
        let Some(payload) = self.payload(&self.handle.snapshot()) else {
            return false;
        };
        if let Err(e) = self.registrar.register(&payload) {
            warn!("GPS failed to update map directory: {}", e);
        }
        true
    }

    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "GPS update interval for map directory is {} seconds",
            self.period.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}
