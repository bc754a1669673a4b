// src/transport/serial.rs
//! NMEA receiver on a serial port, reopened after a fixed delay on failure

use super::{lock, LineBuffer, SessionSlot, Supervisor};
use crate::{
    error::{GpsError, Result},
    gps::nmea,
    state::AcquisitionHandle,
};
use log::{debug, error, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{io::AsyncReadExt, time::sleep};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Reopening a serial port is cheap, so there is no backoff.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Inner {
    slot: SessionSlot,
    /// Set once the current failure episode has been logged.
    failure_logged: bool,
}

pub struct SerialSupervisor {
    path: String,
    baudrate: u32,
    handle: AcquisitionHandle,
    inner: Mutex<Inner>,
}

impl SerialSupervisor {
    pub fn new(path: impl Into<String>, baudrate: u32, handle: AcquisitionHandle) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            baudrate,
            handle,
            inner: Mutex::new(Inner::default()),
        })
    }

    fn label(&self) -> String {
        format!("receiver {} with {} bps", self.path, self.baudrate)
    }

    fn spawn_session(self: &Arc<Self>, inner: &mut Inner) {
        inner.slot.install(|id| {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_session(id).await })
        });
    }

    fn open_port(&self) -> Result<SerialStream> {
        let port = tokio_serial::new(&self.path, self.baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()?;
        debug!("GPS opened serial port {} at {} baud", self.path, self.baudrate);
        Ok(port)
    }

    async fn run_session(self: Arc<Self>, id: u64) {
        let mut port = match self.open_port() {
            Ok(port) => port,
            Err(e) => {
                self.session_failed(id, &e.to_string());
                return;
            }
        };

        let label = self.label();
        let mut buffer = LineBuffer::new();
        let mut chunk = [0u8; 1024];
        loop {
            match port.read(&mut chunk).await {
                Ok(0) => {
                    self.session_failed(id, "Connection closed");
                    return;
                }
                Ok(n) => {
                    if !self.mark_alive(id) {
                        return;
                    }
                    self.feed(&label, &mut buffer, &chunk[..n]);
                }
                Err(e) => {
                    self.session_failed(id, &GpsError::from(e).to_string());
                    return;
                }
            }
        }
    }

    /// Hand every complete sentence in `chunk` to the parser.
    fn feed(&self, label: &str, buffer: &mut LineBuffer, chunk: &[u8]) {
        for line in buffer.push(chunk) {
            self.handle.ingest(label, nmea::parse_nmea_sentence(&line));
        }
    }

    fn mark_alive(&self, id: u64) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.slot.is_current(id) {
            return false;
        }
        inner.failure_logged = false;
        true
    }

    fn session_failed(self: &Arc<Self>, id: u64, reason: &str) {
        {
            let mut inner = lock(&self.inner);
            if !inner.slot.release(id) {
                return;
            }
            if !inner.failure_logged {
                error!("GPS Error on {}: {}", self.path, reason);
                inner.failure_logged = true;
            }
            self.schedule_retry(&mut inner);
        }
        self.handle.transport_failed();
    }

    /// Must run in the same critical section that released the session.
    fn schedule_retry(self: &Arc<Self>, inner: &mut Inner) {
        if inner.slot.is_stopped() || inner.slot.reconnect_pending() {
            return;
        }
        let this = Arc::clone(self);
        inner.slot.arm_reconnect(tokio::spawn(async move {
            sleep(RETRY_DELAY).await;
            this.retry_now();
        }));
    }

    fn retry_now(self: &Arc<Self>) {
        let mut inner = lock(&self.inner);
        inner.slot.disarm_reconnect();
        if inner.slot.is_stopped() {
            return;
        }
        self.spawn_session(&mut inner);
    }
}

impl Supervisor for SerialSupervisor {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn start(self: Arc<Self>, force: bool) {
        let mut inner = lock(&self.inner);
        inner.slot.resume();
        if inner.slot.reconnect_pending() {
            return;
        }
        if !force && inner.slot.is_alive() {
            return;
        }
        self.spawn_session(&mut inner);
    }

    fn stop(&self) {
        lock(&self.inner).slot.stop();
    }

    fn check_health(self: Arc<Self>) {
        {
            let inner = lock(&self.inner);
            if inner.slot.is_stopped() || inner.slot.reconnect_pending() || inner.slot.is_alive() {
                return;
            }
        }
        warn!("GPS lost connection. Attempting to reconnect...");
        self.handle.transport_failed();
        self.start(true);
    }
}
