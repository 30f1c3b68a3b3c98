//! Worker Loop.
//!
//! Registers with the orchestrating host, then polls the heartbeat
//! scheduler on a fixed delay until cancelled. On cancellation it stops
//! scheduled synchronizations, lets in-flight ones finish within the
//! shutdown grace period, signals any child processes still running, and
//! unregisters.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatch::SyncDispatcher;
use crate::heartbeat::HeartbeatScheduler;
use crate::host::HostClient;
use crate::process::ProcessRegistry;
use crate::registration::{registration_request, RegistrationManager};
use crate::synchronizer::SourceSynchronizer;
use crate::vcs::VersionControl;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Registration is mandatory; the worker does no work without it.
    #[error("Registration with the orchestrating host failed")]
    RegistrationFailed,
}

pub struct WorkerLoop {
    config: WorkerConfig,
    host: Arc<dyn HostClient>,
    registration: RegistrationManager,
    dispatcher: Arc<SyncDispatcher>,
    processes: ProcessRegistry,
}

impl WorkerLoop {
    pub fn new(
        config: WorkerConfig,
        host: Arc<dyn HostClient>,
        vcs: Arc<dyn VersionControl>,
        processes: ProcessRegistry,
    ) -> Self {
        let registration = RegistrationManager::new(Arc::clone(&host), config.unregister_timeout);
        let synchronizer = Arc::new(SourceSynchronizer::new(vcs));
        let dispatcher = Arc::new(SyncDispatcher::new(synchronizer, config.sources.clone()));

        Self {
            config,
            host,
            registration,
            dispatcher,
            processes,
        }
    }

    pub fn registration(&self) -> &RegistrationManager {
        &self.registration
    }

    /// Dispatcher for synchronizations assigned to this worker.
    pub fn dispatcher(&self) -> &Arc<SyncDispatcher> {
        &self.dispatcher
    }

    /// Run until `cancel` fires.
    ///
    /// Returns [`WorkerError::RegistrationFailed`] without entering the
    /// polling loop if the host rejects or cannot be reached for
    /// registration.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let request = registration_request(&self.config);
        if !self.registration.initialize(&request).await {
            return Err(WorkerError::RegistrationFailed);
        }

        let mut heartbeat =
            HeartbeatScheduler::new(Arc::clone(&self.host), self.config.heartbeat_interval);

        let schedule_cancel = cancel.child_token();
        let schedule_handle = self.config.sync_interval.map(|interval| {
            tokio::spawn(
                Arc::clone(&self.dispatcher).run_schedule(interval, schedule_cancel.clone()),
            )
        });

        tracing::info!(
            poll_delay_secs = self.config.poll_delay.as_secs(),
            heartbeat_interval_secs = self.config.heartbeat_interval.as_secs(),
            "Worker loop started",
        );

        while !cancel.is_cancelled() {
            heartbeat.send_if_due(self.registration.identity()).await;

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_delay) => {}
            }
        }

        tracing::info!("Worker loop cancelled, shutting down");
        self.shutdown(schedule_cancel, schedule_handle).await;
        Ok(())
    }

    async fn shutdown(
        &mut self,
        schedule_cancel: CancellationToken,
        schedule_handle: Option<tokio::task::JoinHandle<()>>,
    ) {
        schedule_cancel.cancel();
        if let Some(handle) = schedule_handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Sync schedule task ended abnormally");
            }
        }

        let drained = self.dispatcher.shutdown(self.config.shutdown_grace).await;
        let signalled = self.processes.terminate_all();
        if !drained || signalled > 0 {
            tracing::warn!(drained, signalled, "Cleaned up outstanding task work");
        }

        self.registration.unregister().await;
        tracing::info!("Worker shut down");
    }
}
