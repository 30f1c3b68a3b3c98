//! Heartbeat due-time bookkeeping.

use std::time::{Duration, Instant};

/// Default interval between liveness reports.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Last-sent timestamp plus a fixed interval.
///
/// The schedule only advances when a send is recorded, so a failed send
/// leaves the heartbeat due on the very next check.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    interval: Duration,
    last_sent: Instant,
}

impl HeartbeatSchedule {
    /// Start a schedule whose first heartbeat is due one interval after
    /// `started_at`.
    pub fn new(interval: Duration, started_at: Instant) -> Self {
        Self {
            interval,
            last_sent: started_at,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_sent(&self) -> Instant {
        self.last_sent
    }

    pub fn next_due(&self) -> Instant {
        self.last_sent + self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due()
    }

    /// Record a successful send at `now`.
    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }
}
