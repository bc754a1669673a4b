// src/monitor.rs
//! GPS monitor coordination: one live transport, its health check and the
//! periodic consumers of the shared state

use crate::{
    assembler::{Publisher, SampleAssembler, TICK},
    config::{GpsConfig, SimulationConfig},
    error::Result,
    gps::data::{AltitudePolicy, Position},
    map_update::MapUpdater,
    state::{AcquisitionHandle, AcquisitionState},
    status::{ConnectivityStatus, StatusHook},
    transport::{GpsdSupervisor, SerialSupervisor, SimulationSupervisor, Supervisor},
};
use log::info;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// Independent of any reconnect timer a supervisor has armed.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// GPS data source configuration
#[derive(Debug, Clone, PartialEq)]
pub enum GpsSource {
    None,
    Serial { port: String, baudrate: u32 },
    Gpsd { host: String, port: u16 },
    Simulation(SimulationConfig),
}

impl GpsSource {
    pub fn is_configured(&self) -> bool {
        !matches!(self, GpsSource::None)
    }

    fn supervisor(&self, handle: &AcquisitionHandle) -> Option<Arc<dyn Supervisor>> {
        let supervisor: Arc<dyn Supervisor> = match self {
            GpsSource::None => return None,
            GpsSource::Serial { port, baudrate } => {
                SerialSupervisor::new(port.clone(), *baudrate, handle.clone())
            }
            GpsSource::Gpsd { host, port } => {
                GpsdSupervisor::new(host.clone(), *port, handle.clone())
            }
            GpsSource::Simulation(reference) => {
                SimulationSupervisor::new(reference.clone(), handle.clone())
            }
        };
        Some(supervisor)
    }
}

/// Owns the live supervisor and every periodic task built on the shared state.
///
/// Must be driven from inside a tokio runtime.
pub struct GpsMonitor {
    source: GpsSource,
    handle: AcquisitionHandle,
    supervisor: Option<Arc<dyn Supervisor>>,
    health: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl GpsMonitor {
    pub fn new(source: GpsSource, policy: AltitudePolicy, hooks: Vec<Box<dyn StatusHook>>) -> Self {
        let state = AcquisitionState::new(policy, source.is_configured());
        Self {
            source,
            handle: AcquisitionHandle::new(state, hooks),
            supervisor: None,
            health: None,
            tasks: Vec::new(),
        }
    }

    pub fn from_config(config: &GpsConfig, hooks: Vec<Box<dyn StatusHook>>) -> Self {
        Self::new(
            config.transport(),
            AltitudePolicy::new(config.fixed_altitude),
            hooks,
        )
    }

    /// Shared state handle for consumers and tests.
    pub fn handle(&self) -> &AcquisitionHandle {
        &self.handle
    }

    pub fn source(&self) -> &GpsSource {
        &self.source
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.handle.status()
    }

    /// Open the configured transport and start its health check.
    pub fn start(&mut self) {
        if self.supervisor.is_some() {
            return;
        }
        let Some(supervisor) = self.source.supervisor(&self.handle) else {
            info!("GPS receiver off, no source configured");
            return;
        };

        info!("GPS starting {} transport", supervisor.name());
        Arc::clone(&supervisor).start(false);
        self.health = Some(spawn_health_check(Arc::clone(&supervisor)));
        self.supervisor = Some(supervisor);
    }

    /// Tear down the current transport and bring up `source` in its place.
    pub fn switch_source(&mut self, source: GpsSource) {
        self.stop_transport();
        self.handle.transport_replaced(source.is_configured());
        self.source = source;
        self.start();
    }

    /// Publish one assembled sample per second until shutdown.
    pub fn publish_to(&mut self, station: Option<Position>, publisher: Arc<dyn Publisher>) {
        let assembler = SampleAssembler::new(self.handle.clone(), station, publisher);
        self.tasks.push(assembler.spawn(TICK));
    }

    /// Keep the map directory updated while the fix is active.
    pub fn register_with(&mut self, updater: MapUpdater) {
        self.tasks.push(updater.spawn());
    }

    /// Release the transport and cancel every timer and periodic task.
    pub fn shutdown(&mut self) {
        self.stop_transport();
        self.abort_tasks();
        info!("GPS monitor stopped");
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn stop_transport(&mut self) {
        if let Some(health) = self.health.take() {
            health.abort();
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.stop();
            info!("GPS stopped {} transport", supervisor.name());
        }
    }
}

impl Drop for GpsMonitor {
    fn drop(&mut self) {
        self.stop_transport();
        self.abort_tasks();
    }
}

fn spawn_health_check(supervisor: Arc<dyn Supervisor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(
            Instant::now() + HEALTH_CHECK_INTERVAL,
            HEALTH_CHECK_INTERVAL,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            Arc::clone(&supervisor).check_health();
        }
    })
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Install the handlers. Needs a running tokio runtime.
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    #[cfg(unix)]
    pub async fn recv(&mut self) -> Result<()> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = self.terminate.recv() => info!("GPS received SIGTERM"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{ChannelPublisher, PublishMessage};
    use tokio::{
        sync::mpsc,
        time::{sleep, timeout},
    };

    fn drain(rx: &mut mpsc::Receiver<PublishMessage>) -> Vec<PublishMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_end_to_end() {
        let mut monitor = GpsMonitor::new(
            GpsSource::Simulation(SimulationConfig::default()),
            AltitudePolicy::default(),
            vec![],
        );
        monitor.start();

        // First simulated fix lands before the assembler starts ticking
        sleep(Duration::from_millis(500)).await;
        let (publisher, mut rx) = ChannelPublisher::new(16);
        monitor.publish_to(None, Arc::new(publisher));
        sleep(Duration::from_millis(2600)).await;
        monitor.shutdown();

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        for message in messages {
            assert_eq!(message.kind, "GPS");
            let sample = message.value;
            assert_eq!(sample.status, ConnectivityStatus::Active);
            assert!(!sample.lat.is_empty());
            assert!(!sample.lon.is_empty());
            assert!(!sample.alt.is_empty());
            assert_eq!(sample.mode, "3");
            assert!(!sample.satellites.is_empty());
            assert!(sample.satellites.iter().all(|s| s.system.name() == "GPS"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_source_publishes_station() {
        let mut monitor = GpsMonitor::new(GpsSource::None, AltitudePolicy::new(Some(160.0)), vec![]);
        monitor.start();
        assert_eq!(monitor.status(), ConnectivityStatus::Off);

        let (publisher, mut rx) = ChannelPublisher::new(4);
        let station = Position {
            latitude: 50.0,
            longitude: 8.25,
        };
        monitor.publish_to(Some(station), Arc::new(publisher));
        sleep(Duration::from_millis(100)).await;
        monitor.shutdown();

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        let sample = &messages[0].value;
        assert_eq!(sample.status, ConnectivityStatus::Off);
        assert_eq!(sample.lat, "50.000000000");
        assert_eq!(sample.mode, "2");
        assert_eq!(sample.alt, "160.000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_source_replaces_transport() {
        let mut monitor = GpsMonitor::new(
            GpsSource::Simulation(SimulationConfig::default()),
            AltitudePolicy::default(),
            vec![],
        );
        monitor.start();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(monitor.status(), ConnectivityStatus::Active);

        monitor.switch_source(GpsSource::None);
        assert_eq!(monitor.status(), ConnectivityStatus::Off);
        assert!(monitor.supervisor.is_none());
        assert!(monitor.health.is_none());

        // The stopped simulator no longer writes into the shared state
        sleep(Duration::from_secs(3)).await;
        assert_eq!(monitor.status(), ConnectivityStatus::Off);
        assert!(monitor.handle().snapshot().fix.position.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let mut monitor = GpsMonitor::new(
            GpsSource::Simulation(SimulationConfig::default()),
            AltitudePolicy::default(),
            vec![],
        );
        monitor.start();
        let first = Arc::clone(monitor.supervisor.as_ref().unwrap());
        monitor.start();
        assert!(Arc::ptr_eq(monitor.supervisor.as_ref().unwrap(), &first));
        monitor.shutdown();
    }

    #[test]
    fn test_source_from_config() {
        let config = GpsConfig {
            source: "simulate".to_string(),
            ..GpsConfig::default()
        };
        let monitor = GpsMonitor::from_config(&config, vec![]);
        assert!(monitor.source().is_configured());
        assert_eq!(monitor.status(), ConnectivityStatus::Inactive);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_resolves_shutdown_signal() {
        let mut signal = ShutdownSignal::new().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        timeout(Duration::from_secs(5), signal.recv())
            .await
            .expect("SIGTERM was not delivered")
            .unwrap();
    }
}
