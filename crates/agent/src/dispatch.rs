//! Sync Dispatcher.
//!
//! Runs source synchronizations on their own tokio tasks so that slow
//! clones never hold up heartbeat polling. At most one synchronization
//! per source is in flight at any time; a dispatch for a busy source is
//! skipped rather than queued.
//!
//! [`SyncDispatcher::run_schedule`] re-dispatches every configured source
//! on a fixed interval until cancelled.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use taskrunner_core::sources::SourceDescriptor;
use taskrunner_core::sync::SyncOutcome;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::synchronizer::SourceSynchronizer;

type InFlightSet = Arc<Mutex<HashSet<String>>>;

pub struct SyncDispatcher {
    synchronizer: Arc<SourceSynchronizer>,
    sources: Vec<SourceDescriptor>,
    in_flight: InFlightSet,
    tasks: TaskTracker,
}

/// Marks a source busy; clears the mark when dropped.
struct InFlightGuard {
    set: InFlightSet,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.name);
    }
}

impl SyncDispatcher {
    pub fn new(synchronizer: Arc<SourceSynchronizer>, sources: Vec<SourceDescriptor>) -> Self {
        Self {
            synchronizer,
            sources,
            in_flight: Arc::default(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Names of sources with a synchronization currently running, sorted.
    pub fn in_flight(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.in_flight).iter().cloned().collect();
        names.sort();
        names
    }

    /// Start synchronizing `source` in the background.
    ///
    /// Returns `None` when that source is already being synchronized or
    /// the dispatcher has been shut down.
    pub fn dispatch(&self, source: SourceDescriptor) -> Option<JoinHandle<SyncOutcome>> {
        if self.tasks.is_closed() {
            tracing::debug!(source = %source.name, "Dispatcher closed, not starting sync");
            return None;
        }
        if !lock(&self.in_flight).insert(source.name.clone()) {
            tracing::info!(source = %source.name, "Sync already in progress, skipping");
            return None;
        }

        let guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            name: source.name.clone(),
        };
        let synchronizer = Arc::clone(&self.synchronizer);

        Some(self.tasks.spawn(async move {
            let _guard = guard;
            synchronizer.synchronize(&source).await
        }))
    }

    /// Dispatch every configured source; returns handles for the ones
    /// that were started.
    pub fn dispatch_all(&self) -> Vec<JoinHandle<SyncOutcome>> {
        self.sources
            .iter()
            .filter_map(|source| self.dispatch(source.clone()))
            .collect()
    }

    /// Dispatch all sources every `interval` (first round immediately)
    /// until `cancel` fires.
    pub async fn run_schedule(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            sources = self.sources.len(),
            "Sync schedule started",
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sync schedule stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let handles = self.dispatch_all();
                    tracing::debug!(started = handles.len(), "Scheduled sync round dispatched");
                    if !handles.is_empty() {
                        self.tasks.spawn(report_round(handles));
                    }
                }
            }
        }
    }

    /// Stop accepting dispatches and wait up to `grace` for running
    /// synchronizations. Returns `true` if all of them finished.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tasks.close();

        if tokio::time::timeout(grace, self.tasks.wait()).await.is_ok() {
            return true;
        }

        tracing::warn!(
            grace_secs = grace.as_secs(),
            in_flight = ?self.in_flight(),
            "Synchronizations still running after shutdown grace period",
        );
        false
    }
}

/// Outcome counts for one scheduled round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RoundSummary {
    refreshed: usize,
    up_to_date: usize,
    failed: usize,
}

/// Wait for one scheduled round and log a summary of its outcomes.
async fn report_round(handles: Vec<JoinHandle<SyncOutcome>>) -> RoundSummary {
    let mut summary = RoundSummary::default();
    for result in futures::future::join_all(handles).await {
        match result {
            Ok(outcome) if outcome.is_failed() => summary.failed += 1,
            Ok(SyncOutcome::Refreshed) => summary.refreshed += 1,
            Ok(_) => summary.up_to_date += 1,
            Err(e) => {
                tracing::error!(error = %e, "Sync task panicked");
                summary.failed += 1;
            }
        }
    }
    tracing::info!(
        refreshed = summary.refreshed,
        up_to_date = summary.up_to_date,
        failed = summary.failed,
        "Sync round finished",
    );
    summary
}

fn lock(set: &InFlightSet) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
