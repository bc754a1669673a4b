// src/main.rs
//! gps-feed - publishes one normalized GPS sample per second as JSON lines

use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env, Target};
use gps_feed::{
    map_update::{LogRegistrar, MapUpdater},
    monitor::list_serial_ports,
    GpsConfig, GpsMonitor, LogAlerts, ShutdownSignal, StatusHook, StdoutPublisher, TerminalBell,
};
use log::info;
use std::{path::PathBuf, sync::Arc};

#[derive(Parser, Debug)]
#[command(name = "gps-feed", version)]
#[command(about = "Serial NMEA, gpsd or simulated GPS normalized into one JSON sample per second")]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path, "gpsd", "simulate", or "" for no receiver
    #[arg(short, long)]
    source: Option<String>,

    #[arg(short, long)]
    baudrate: Option<u32>,

    #[arg(long)]
    gpsd_host: Option<String>,

    #[arg(long)]
    gpsd_port: Option<u16>,

    /// Fixed altitude in meters; forces 2D mode
    #[arg(long)]
    fixed_altitude: Option<f64>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

impl Cli {
    fn apply(&self, config: &mut GpsConfig) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(baudrate) = self.baudrate {
            config.baudrate = baudrate;
        }
        if let Some(host) = &self.gpsd_host {
            config.gpsd_host = host.clone();
        }
        if let Some(port) = self.gpsd_port {
            config.gpsd_port = port;
        }
        if self.fixed_altitude.is_some() {
            config.fixed_altitude = self.fixed_altitude;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the published samples
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        list_serial_ports()?;
        return Ok(());
    }

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => GpsConfig::default_path()?,
    };
    let mut config = GpsConfig::load_or_create(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    cli.apply(&mut config);

    let mut hooks: Vec<Box<dyn StatusHook>> = vec![Box::new(LogAlerts)];
    if config.beep_control {
        hooks.push(Box::new(TerminalBell));
    }

    let mut shutdown = ShutdownSignal::new().context("installing signal handlers")?;
    let mut monitor = GpsMonitor::from_config(&config, hooks);
    monitor.start();
    monitor.publish_to(config.station_position(), Arc::new(StdoutPublisher));
    if config.update_map_pos {
        monitor.register_with(MapUpdater::new(
            &config,
            monitor.handle().clone(),
            Arc::new(LogRegistrar),
        ));
    }

    shutdown
        .recv()
        .await
        .context("waiting for termination signal")?;
    info!("GPS shutting down");
    monitor.shutdown();

    Ok(())
}
