//! Online/offline state machine.
//!
//! ```text
//!   UNKNOWN ──success──► ONLINE ──threshold failures──► OFFLINE
//!      │                   ▲                               │
//!      └─threshold failures┼──────────► OFFLINE            │
//!                          └───────────success─────────────┘
//! ```
//!
//! Exactly one OFFLINE alert per failure run that reaches the threshold,
//! exactly one BACK ONLINE per recovery from such a run. The first success
//! out of UNKNOWN is announced once and is never counted as a recovery.

use chrono::{DateTime, Local};
use lnwatch_core::NodeSnapshot;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Unknown,
    Online,
    Offline,
}

/// A state change that must be announced to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    InitialOnline,
    BackOnline { downtime: Duration },
    Offline { last_success: DateTime<Local>, failures: u32 },
}

/// Monitor-owned record of what the last polls showed.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub last_status: NodeStatus,
    pub consecutive_failures: u32,
    pub last_successful_check: DateTime<Local>,
    pub offline_alert_sent: bool,
    pub last_snapshot: Option<NodeSnapshot>,
}

impl MonitorState {
    /// Fresh state; `started` stands in for the last success until the node
    /// is first reached.
    pub fn new(started: DateTime<Local>) -> Self {
        Self {
            last_status: NodeStatus::Unknown,
            consecutive_failures: 0,
            last_successful_check: started,
            offline_alert_sent: false,
            last_snapshot: None,
        }
    }

    /// Apply a successful poll.
    pub fn record_success(&mut self, now: DateTime<Local>, snapshot: NodeSnapshot) -> Option<Transition> {
        let prior = self.last_status;
        let previous_success = self.last_successful_check;

        self.consecutive_failures = 0;
        self.last_successful_check = now;
        self.last_status = NodeStatus::Online;
        self.last_snapshot = Some(snapshot);

        if prior == NodeStatus::Unknown {
            Some(Transition::InitialOnline)
        } else if self.offline_alert_sent {
            self.offline_alert_sent = false;
            let downtime = (now - previous_success).to_std().unwrap_or_default();
            Some(Transition::BackOnline { downtime })
        } else {
            None
        }
    }

    /// Count a failed poll and return the new run length.
    pub fn note_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Raise the offline alert if the run reached `threshold` and no alert
    /// is outstanding.
    pub fn check_offline(&mut self, threshold: u32) -> Option<Transition> {
        if self.consecutive_failures >= threshold && !self.offline_alert_sent {
            self.offline_alert_sent = true;
            self.last_status = NodeStatus::Offline;
            Some(Transition::Offline {
                last_success: self.last_successful_check,
                failures: self.consecutive_failures,
            })
        } else {
            None
        }
    }
}
