//! Heartbeat Scheduler.
//!
//! Polled by the worker loop. Sends a liveness report only when the
//! schedule says one is due, and only advances the schedule when the
//! host accepted it.

use std::sync::Arc;
use std::time::Duration;

use taskrunner_core::heartbeat::HeartbeatSchedule;
use taskrunner_core::types::WorkerIdentity;
use tokio::time::Instant;

use crate::host::HostClient;

/// What a single [`HeartbeatScheduler::send_if_due`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Interval not yet elapsed; no I/O performed.
    NotDue,
    /// No identity to report under; no I/O performed.
    NotRegistered,
    Sent,
    /// The host call failed; the heartbeat stays due.
    Failed,
}

pub struct HeartbeatScheduler {
    host: Arc<dyn HostClient>,
    schedule: HeartbeatSchedule,
}

impl HeartbeatScheduler {
    /// The first heartbeat becomes due one `interval` from now.
    pub fn new(host: Arc<dyn HostClient>, interval: Duration) -> Self {
        Self {
            host,
            schedule: HeartbeatSchedule::new(interval, Instant::now().into_std()),
        }
    }

    pub fn schedule(&self) -> &HeartbeatSchedule {
        &self.schedule
    }

    pub async fn send_if_due(&mut self, identity: Option<&WorkerIdentity>) -> HeartbeatOutcome {
        if !self.schedule.is_due(Instant::now().into_std()) {
            return HeartbeatOutcome::NotDue;
        }

        let Some(identity) = identity else {
            return HeartbeatOutcome::NotRegistered;
        };

        match self.host.heartbeat(identity).await {
            Ok(()) => {
                self.schedule.record_sent(Instant::now().into_std());
                tracing::debug!(worker_id = %identity, "Heartbeat sent");
                HeartbeatOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(
                    worker_id = %identity,
                    error = %e,
                    "Heartbeat failed, retrying on next poll",
                );
                HeartbeatOutcome::Failed
            }
        }
    }
}
