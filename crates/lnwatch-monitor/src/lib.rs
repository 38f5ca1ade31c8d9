//! lnwatch monitor - polls the node on a fixed interval and alerts the
//! operator on online/offline transitions.

pub mod messages;
pub mod state;

use chrono::Local;
use futures::FutureExt;
use lnwatch_core::config::MonitorConfig;
use lnwatch_core::{NodeSnapshot, Notifier};
use lnwatch_node::{CircuitRefresher, NodeApi, RefreshReason};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub use state::{MonitorState, NodeStatus, Transition};

/// The failure count at which a reactive circuit refresh and immediate
/// re-check are attempted.
pub const RECHECK_AT_FAILURE: u32 = 2;

const HEARTBEAT_EVERY: Duration = Duration::from_secs(30 * 60);

/// Result of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Online,
    Failed,
    /// The poll failed but the re-check after a reactive refresh succeeded.
    /// The next tick runs immediately.
    RecoveredOnRecheck,
}

/// Owns [`MonitorState`] and drives it from node polls.
pub struct StatusMonitor {
    node: Arc<dyn NodeApi>,
    circuit: Arc<CircuitRefresher>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    state: MonitorState,
    last_heartbeat: Option<Instant>,
}

impl StatusMonitor {
    pub fn new(
        node: Arc<dyn NodeApi>,
        circuit: Arc<CircuitRefresher>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            node,
            circuit,
            notifier,
            config,
            state: MonitorState::new(Local::now()),
            last_heartbeat: None,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Run one poll cycle: periodic refresh, poll, state update, alerts.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.circuit.is_due() {
            self.circuit.refresh(RefreshReason::Periodic).await;
        }

        info!("Checking node at {}", Local::now().format("%H:%M:%S"));
        if let Some(snapshot) = self.poll().await {
            self.on_success(snapshot).await;
            return TickOutcome::Online;
        }

        let failures = self.state.note_failure();
        warn!("Failed attempt {}/{}", failures, self.config.failure_threshold);

        if failures == RECHECK_AT_FAILURE {
            self.circuit.refresh(RefreshReason::Reactive).await;
            if let Some(snapshot) = self.poll().await {
                info!("Node reachable again after circuit refresh");
                self.on_success(snapshot).await;
                return TickOutcome::RecoveredOnRecheck;
            }
        }

        if let Some(transition) = self.state.check_offline(self.config.failure_threshold) {
            error!("Node considered offline");
            self.announce(transition).await;
        }
        TickOutcome::Failed
    }

    async fn poll(&self) -> Option<NodeSnapshot> {
        self.node.get_info().await.map(|info| NodeSnapshot::from_json(&info))
    }

    async fn on_success(&mut self, snapshot: NodeSnapshot) {
        match self.state.record_success(Local::now(), snapshot) {
            Some(transition) => {
                self.last_heartbeat = Some(Instant::now());
                self.announce(transition).await;
            }
            None => {
                let due = self
                    .last_heartbeat
                    .is_none_or(|at| at.elapsed() >= HEARTBEAT_EVERY);
                if due {
                    info!("Node working correctly");
                    self.last_heartbeat = Some(Instant::now());
                }
            }
        }
    }

    async fn announce(&self, transition: Transition) {
        let now = Local::now();
        let text = match (&transition, &self.state.last_snapshot) {
            (Transition::InitialOnline, Some(node)) => messages::initial_online(now, node),
            (Transition::BackOnline { downtime }, Some(node)) => {
                info!(downtime = ?downtime, "Node back online");
                messages::back_online(now, *downtime, node)
            }
            (Transition::Offline { last_success, failures }, _) => {
                messages::offline(now, *last_success, *failures)
            }
            // Online transitions always carry the snapshot that caused them.
            (_, None) => return,
        };

        match self.notifier.notify(&text).await {
            Ok(()) => info!(?transition, "Notification sent"),
            Err(e) => error!(?transition, "Failed to send notification: {}", e),
        }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.check_interval,
            threshold = self.config.failure_threshold,
            refresh_interval = ?self.circuit.interval(),
            "Starting monitoring"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = Instant::now();

            let outcome = tokio::select! {
                outcome = AssertUnwindSafe(self.tick()).catch_unwind() => outcome,
                _ = shutdown.changed() => break,
            };

            let wake_at = match outcome {
                Ok(TickOutcome::RecoveredOnRecheck) => continue,
                Ok(_) => started + self.config.check_interval,
                Err(_) => {
                    error!(
                        backoff = ?self.config.error_backoff,
                        "Error in monitor loop, backing off"
                    );
                    Instant::now() + self.config.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Monitor loop stopped");
    }
}
