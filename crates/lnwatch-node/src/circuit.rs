//! Tor circuit refresh.
//!
//! A refresh asks the local Tor daemon to abandon its current circuits. Two
//! mechanisms are tried in order:
//!
//! 1. `SIGNAL NEWNYM` over the control port
//! 2. `SIGHUP` to the `tor` process (when enabled)
//!
//! Failure of every mechanism is logged and never reported to the caller.
//! All refreshes, periodic or reactive, stamp the same clock.

use lnwatch_core::config::TorConfig;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use stem_rs::controller::Controller;
use tracing::{debug, info, warn};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a refresh was requested, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The refresh interval elapsed.
    Periodic,
    /// The monitor saw repeated failed polls.
    Reactive,
    /// A request timed out or could not connect.
    Transport,
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshReason::Periodic => "periodic",
            RefreshReason::Reactive => "reactive",
            RefreshReason::Transport => "transport",
        };
        f.write_str(name)
    }
}

/// Issues circuit refreshes and owns the shared refresh cooldown.
#[derive(Debug)]
pub struct CircuitRefresher {
    control_addr: Option<String>,
    control_password: Option<String>,
    signal_fallback: bool,
    interval: Duration,
    settle_delay: Duration,
    origin: Instant,
    /// Milliseconds after `origin` of the last refresh attempt.
    last_refresh_ms: AtomicU64,
    attempts: AtomicU64,
}

impl CircuitRefresher {
    pub fn new(config: &TorConfig) -> Self {
        Self {
            control_addr: config.control_addr.clone(),
            control_password: config.control_password.clone(),
            signal_fallback: config.signal_fallback,
            interval: config.refresh_interval,
            settle_delay: config.settle_delay,
            origin: Instant::now(),
            last_refresh_ms: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    /// A refresher with no mechanisms: refreshes only stamp the clock.
    pub fn without_mechanisms(interval: Duration, settle_delay: Duration) -> Self {
        Self {
            control_addr: None,
            control_password: None,
            signal_fallback: false,
            interval,
            settle_delay,
            origin: Instant::now(),
            last_refresh_ms: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time since the last refresh attempt, or since creation if none.
    pub fn since_last_refresh(&self) -> Duration {
        let last = Duration::from_millis(self.last_refresh_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }

    /// Whether the cooldown has elapsed.
    pub fn is_due(&self) -> bool {
        self.since_last_refresh() >= self.interval
    }

    /// Number of refresh attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn stamp(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_refresh_ms.store(now, Ordering::Relaxed);
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Request new circuits, then wait the settle delay.
    ///
    /// Returns whether any mechanism reported success. The cooldown clock is
    /// stamped either way.
    pub async fn refresh(&self, reason: RefreshReason) -> bool {
        self.stamp();
        info!(reason = %reason, "Refreshing Tor circuits");

        let mut refreshed = false;

        if let Some(addr) = &self.control_addr {
            match self.newnym_via_control(addr).await {
                Ok(()) => {
                    info!(control = %addr, "NEWNYM accepted by Tor control port");
                    refreshed = true;
                }
                Err(e) => warn!(control = %addr, "NEWNYM via control port failed: {}", e),
            }
        }

        if !refreshed && self.signal_fallback {
            match hup_tor_process().await {
                Ok(()) => {
                    info!("Sent SIGHUP to tor process");
                    refreshed = true;
                }
                Err(e) => warn!("SIGHUP to tor process failed: {}", e),
            }
        }

        if !refreshed {
            warn!(reason = %reason, "No circuit refresh mechanism succeeded, continuing");
        }

        if !self.settle_delay.is_zero() {
            debug!(delay = ?self.settle_delay, "Waiting for circuits to settle");
            tokio::time::sleep(self.settle_delay).await;
        }

        refreshed
    }

    async fn newnym_via_control(&self, addr: &str) -> Result<(), String> {
        let socket: SocketAddr = addr
            .parse()
            .map_err(|e| format!("invalid control address: {}", e))?;
        let password = self.control_password.as_deref();

        let attempt = async {
            let mut controller = Controller::from_port(socket)
                .await
                .map_err(|e| e.to_string())?;
            controller
                .authenticate(password)
                .await
                .map_err(|e| format!("authentication failed: {}", e))?;
            controller
                .signal(stem_rs::Signal::Newnym)
                .await
                .map_err(|e| e.to_string())
        };

        match tokio::time::timeout(CONTROL_TIMEOUT, attempt).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {:?}", CONTROL_TIMEOUT)),
        }
    }
}

async fn hup_tor_process() -> Result<(), String> {
    let status = tokio::process::Command::new("pkill")
        .args(["-HUP", "-x", "tor"])
        .status()
        .await
        .map_err(|e| e.to_string())?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("pkill exited with {}", status))
    }
}
