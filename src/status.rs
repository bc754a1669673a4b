// src/status.rs
//! Connectivity status derived from the update stream and transport health

use log::{info, warn};
use serde::Serialize;
use std::{fmt, io::Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    /// No transport configured
    Off,
    /// Transport alive, no valid fix
    Inactive,
    /// Valid fix currently present
    Active,
    /// Transport failed its health check
    Error,
}

impl ConnectivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityStatus::Off => "off",
            ConnectivityStatus::Inactive => "inactive",
            ConnectivityStatus::Active => "active",
            ConnectivityStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectivityStatus,
    pub to: ConnectivityStatus,
}

/// Edge-triggered status tracker.
///
/// Every state change returns exactly one [`Transition`]; setting the
/// status it already holds returns nothing.
#[derive(Debug, Clone)]
pub struct ConnectivityMachine {
    status: ConnectivityStatus,
    detected: bool,
    fix_logged: Option<bool>,
}

impl ConnectivityMachine {
    pub fn new(transport_configured: bool) -> Self {
        let status = if transport_configured {
            ConnectivityStatus::Inactive
        } else {
            ConnectivityStatus::Off
        };
        Self {
            status,
            detected: false,
            fix_logged: None,
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status
    }

    /// Mark that data arrived. Returns `true` on first contact of a connection episode.
    pub fn record_contact(&mut self) -> bool {
        !std::mem::replace(&mut self.detected, true)
    }

    /// Feed the fix verdict of one received line.
    ///
    /// Lines without a verdict keep the current status, except that they
    /// pull an `off` or `error` status back to `inactive`.
    pub fn observe(&mut self, verdict: Option<bool>) -> Option<Transition> {
        let next = match verdict {
            Some(true) => ConnectivityStatus::Active,
            Some(false) => ConnectivityStatus::Inactive,
            None => match self.status {
                ConnectivityStatus::Off | ConnectivityStatus::Error => ConnectivityStatus::Inactive,
                current => current,
            },
        };

        if let Some(fix) = verdict {
            if self.fix_logged != Some(fix) {
                if fix {
                    info!("GPS received data");
                } else {
                    warn!("GPS received no data");
                }
                self.fix_logged = Some(fix);
            }
        }

        self.set(next)
    }

    /// The transport failed; the next data starts a new detection episode.
    pub fn transport_failed(&mut self) -> Option<Transition> {
        self.detected = false;
        self.fix_logged = None;
        self.set(ConnectivityStatus::Error)
    }

    /// A different transport replaced the old one (or none is left).
    pub fn reset(&mut self, transport_configured: bool) -> Option<Transition> {
        self.detected = false;
        self.fix_logged = None;
        self.set(if transport_configured {
            ConnectivityStatus::Inactive
        } else {
            ConnectivityStatus::Off
        })
    }

    pub fn set(&mut self, status: ConnectivityStatus) -> Option<Transition> {
        if status == self.status {
            return None;
        }
        let transition = Transition {
            from: self.status,
            to: status,
        };
        self.status = status;
        Some(transition)
    }
}

/// Side effect run once per status change.
pub trait StatusHook: Send + Sync {
    fn on_transition(&self, transition: Transition);
}

/// Logs an operator-facing alert for each new status.
#[derive(Debug, Default)]
pub struct LogAlerts;

impl StatusHook for LogAlerts {
    fn on_transition(&self, transition: Transition) {
        match transition.to {
            ConnectivityStatus::Active => info!("GPS status active: Received data"),
            ConnectivityStatus::Inactive => warn!("GPS status inactive: No data received"),
            ConnectivityStatus::Off => info!("GPS status off: Receiver off"),
            ConnectivityStatus::Error => warn!("GPS status error: Connection lost"),
        }
    }
}

/// Audible cue on the terminal when the fix is gained or lost.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl StatusHook for TerminalBell {
    fn on_transition(&self, transition: Transition) {
        let cue: &[u8] = match transition.to {
            ConnectivityStatus::Active => b"\x07\x07",
            ConnectivityStatus::Inactive => b"\x07",
            _ => return,
        };
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(cue).and_then(|_| stderr.flush());
    }
}
