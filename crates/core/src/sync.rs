//! Result of a single source synchronization attempt.

use std::fmt;

use serde::Serialize;

/// Produced fresh for every synchronization call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Upstream had no new commits; nothing was staged.
    UpToDate,
    /// Upstream changed and the artifacts were re-staged.
    Refreshed,
    /// The attempt failed. Carries a human-readable reason.
    Failed(String),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::UpToDate => f.write_str("up to date"),
            SyncOutcome::Refreshed => f.write_str("refreshed"),
            SyncOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
