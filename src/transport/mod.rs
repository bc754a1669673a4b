// src/transport/mod.rs
//! Transport supervisors: one live receiver connection with reconnect handling

pub mod gpsd;
pub mod line_buffer;
pub mod serial;
pub mod simulation;

pub use gpsd::GpsdSupervisor;
pub use line_buffer::LineBuffer;
pub use serial::SerialSupervisor;
pub use simulation::SimulationSupervisor;

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};

/// Owner of exactly one transport session.
///
/// Must be driven from inside a tokio runtime; sessions and timers are tasks.
pub trait Supervisor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the transport. With `force`, an existing session is torn down and
    /// replaced; a pending reconnect makes this a no-op either way.
    fn start(self: std::sync::Arc<Self>, force: bool);

    /// Tear down the session and cancel every pending timer.
    fn stop(&self);

    /// Periodic liveness check; restarts the transport when it is dead or stale.
    fn check_health(self: std::sync::Arc<Self>);
}

/// Exponential reconnect delay plus the last time data was seen.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    last_data: Instant,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
            last_data: Instant::now(),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Delay to wait before the next attempt; doubles the following one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Data arrived: back to the minimum delay and restart the stale clock.
    pub fn mark_data(&mut self) {
        self.reset();
        self.touch();
    }

    /// Restart the stale clock without touching the delay.
    pub fn touch(&mut self) {
        self.last_data = Instant::now();
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_data.elapsed() > timeout
    }
}

/// The live session task and the pending reconnect timer of one supervisor.
///
/// Sessions carry an id so callbacks from a replaced session can be told apart
/// from the current one.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    session: Option<(u64, JoinHandle<()>)>,
    reconnect: Option<JoinHandle<()>>,
    next_id: u64,
    stopped: bool,
}

impl SessionSlot {
    /// Replace any session with a new one built by `spawn`.
    pub fn install(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) -> u64 {
        self.teardown();
        self.stopped = false;
        self.next_id += 1;
        let id = self.next_id;
        self.session = Some((id, spawn(id)));
        id
    }

    pub fn is_current(&self, id: u64) -> bool {
        !self.stopped && matches!(self.session, Some((current, _)) if current == id)
    }

    pub fn is_alive(&self) -> bool {
        matches!(&self.session, Some((_, task)) if !task.is_finished())
    }

    /// A session ended on its own. Returns `false` for stale sessions.
    pub fn release(&mut self, id: u64) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.session = None;
        true
    }

    pub fn teardown(&mut self) {
        if let Some((_, task)) = self.session.take() {
            task.abort();
        }
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn arm_reconnect(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.reconnect.replace(timer) {
            old.abort();
        }
    }

    /// Called by the reconnect timer itself when it fires.
    pub fn disarm_reconnect(&mut self) {
        self.reconnect = None;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn resume(&mut self) {
        self.stopped = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
        self.teardown();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
