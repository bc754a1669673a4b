// src/transport/gpsd.rs
//! gpsd TCP client with exponential reconnect backoff

use super::{lock, Backoff, LineBuffer, SessionSlot, Supervisor};
use crate::{gps::gpsd, state::AcquisitionHandle};
use log::{debug, error, info, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{io::AsyncReadExt, time::sleep};

pub const BACKOFF_MIN: Duration = Duration::from_secs(1);
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);
/// No bytes for this long counts as a dead connection.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(15);

struct Inner {
    slot: SessionSlot,
    backoff: Backoff,
}

pub struct GpsdSupervisor {
    host: String,
    port: u16,
    handle: AcquisitionHandle,
    inner: Mutex<Inner>,
}

impl GpsdSupervisor {
    pub fn new(host: impl Into<String>, port: u16, handle: AcquisitionHandle) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            port,
            handle,
            inner: Mutex::new(Inner {
                slot: SessionSlot::default(),
                backoff: Backoff::new(BACKOFF_MIN, BACKOFF_MAX),
            }),
        })
    }

    fn label(&self) -> String {
        format!("gpsd at {}:{}", self.host, self.port)
    }

    /// Delay the next scheduled reconnect will wait.
    pub fn current_backoff(&self) -> Duration {
        lock(&self.inner).backoff.current()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).slot.is_alive()
    }

    fn spawn_session(self: &Arc<Self>, inner: &mut Inner) {
        inner.backoff.touch();
        inner.slot.install(|id| {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_session(id).await })
        });
    }

    async fn run_session(self: Arc<Self>, id: u64) {
        let label = self.label();

        let mut stream = match gpsd::connect_gpsd(&self.host, self.port).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("GPS {}", e);
                self.session_failed(id, "gpsd connect failed");
                return;
            }
        };

        {
            let mut inner = lock(&self.inner);
            if !inner.slot.is_current(id) {
                return;
            }
            inner.backoff.reset();
        }
        info!("GPS using gpsd for GPS data ({}:{})", self.host, self.port);

        let mut buffer = LineBuffer::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    self.session_failed(id, "gpsd socket closed");
                    return;
                }
                Ok(n) => {
                    if !self.mark_alive(id) {
                        return;
                    }
                    for line in buffer.push(&chunk[..n]) {
                        self.handle.ingest(&label, gpsd::parse_gpsd_json(&line));
                    }
                }
                Err(e) => {
                    error!("GPS gpsd socket error: {}", e);
                    self.session_failed(id, "gpsd socket error");
                    return;
                }
            }
        }
    }

    fn mark_alive(&self, id: u64) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.slot.is_current(id) {
            return false;
        }
        inner.backoff.mark_data();
        true
    }

    fn session_failed(self: &Arc<Self>, id: u64, reason: &str) {
        {
            let mut inner = lock(&self.inner);
            if !inner.slot.release(id) {
                return;
            }
            self.schedule_reconnect(&mut inner, reason);
        }
        self.handle.transport_failed();
    }

    /// Must run in the same critical section that released the session.
    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner, reason: &str) {
        if inner.slot.is_stopped() || inner.slot.reconnect_pending() {
            return;
        }

        let delay = inner.backoff.next_delay();
        warn!(
            "GPS lost connection. Attempting to reconnect in {:?}... ({})",
            delay, reason
        );

        let this = Arc::clone(self);
        inner.slot.arm_reconnect(tokio::spawn(async move {
            sleep(delay).await;
            this.reconnect_now();
        }));
    }

    fn reconnect_now(self: &Arc<Self>) {
        let mut inner = lock(&self.inner);
        inner.slot.disarm_reconnect();
        if inner.slot.is_stopped() {
            return;
        }
        self.spawn_session(&mut inner);
    }
}

impl Supervisor for GpsdSupervisor {
    fn name(&self) -> &'static str {
        "gpsd"
    }

    fn start(self: Arc<Self>, force: bool) {
        let mut inner = lock(&self.inner);
        inner.slot.resume();
        if inner.slot.reconnect_pending() {
            debug!("GPS gpsd reconnect already pending");
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
        let (dead, stale) = {
            let inner = lock(&self.inner);
            if inner.slot.is_stopped() || inner.slot.reconnect_pending() {
                return;
            }
            (!inner.slot.is_alive(), inner.backoff.is_stale(DATA_TIMEOUT))
        };

        if dead {
            self.handle.transport_failed();
            self.start(true);
        } else if stale {
            warn!("GPS gpsd data timeout (stale). Reconnecting...");
            self.handle.transport_failed();
            self.start(true);
        }
    }
}
