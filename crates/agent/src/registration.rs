//! Registration Manager.
//!
//! Negotiates the worker's identity with the orchestrating host. One
//! handshake per [`initialize`](RegistrationManager::initialize) call,
//! no internal retries; unregistration is best-effort and always leaves
//! the manager unregistered.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskrunner_core::registration::{Registration, RegistrationState};
use taskrunner_core::types::WorkerIdentity;

use crate::config::WorkerConfig;
use crate::host::{HostClient, HostError, RegistrationRequest};

/// Build the registration metadata for this process.
pub fn registration_request(config: &WorkerConfig) -> RegistrationRequest {
    RegistrationRequest {
        name: config.worker_name.clone(),
        hostname: config.hostname.clone(),
        instance_id: uuid::Uuid::new_v4().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pid: std::process::id(),
        capabilities: config.sources.iter().map(|s| s.name.clone()).collect(),
        started_at: Utc::now(),
    }
}

pub struct RegistrationManager {
    host: Arc<dyn HostClient>,
    registration: Registration,
    unregister_timeout: Duration,
}

impl RegistrationManager {
    pub fn new(host: Arc<dyn HostClient>, unregister_timeout: Duration) -> Self {
        Self {
            host,
            registration: Registration::new(),
            unregister_timeout,
        }
    }

    /// Attempt one registration handshake. Returns whether the worker is
    /// now registered.
    pub async fn initialize(&mut self, request: &RegistrationRequest) -> bool {
        if let Err(e) = self.registration.begin() {
            tracing::warn!(error = %e, "Registration requested in unexpected state");
            return self.registration.is_registered();
        }

        tracing::info!(
            name = %request.name,
            instance_id = %request.instance_id,
            "Registering with host",
        );

        match self.host.register(request).await {
            Ok(identity) => {
                tracing::info!(worker_id = %identity, "Registered with host");
                self.transition(|reg| reg.complete(identity));
            }
            Err(e) => {
                tracing::error!(error = %e, "Registration with host failed");
                self.transition(Registration::fail);
            }
        }

        self.registration.is_registered()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_registered()
    }

    pub fn state(&self) -> RegistrationState {
        self.registration.state()
    }

    pub fn identity(&self) -> Option<&WorkerIdentity> {
        self.registration.identity()
    }

    /// Tell the host the worker is leaving.
    ///
    /// The notification is bounded by the unregister timeout and its
    /// failure is only logged; the manager always ends up unregistered.
    pub async fn unregister(&mut self) {
        let identity = match self.registration.begin_unregister() {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(error = %e, "Nothing to unregister");
                return;
            }
        };

        tracing::info!(worker_id = %identity, "Unregistering from host");

        let result = match tokio::time::timeout(
            self.unregister_timeout,
            self.host.unregister(&identity),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HostError::Timeout(self.unregister_timeout)),
        };

        match result {
            Ok(()) => tracing::info!(worker_id = %identity, "Unregistered from host"),
            Err(e) => tracing::warn!(
                worker_id = %identity,
                error = %e,
                "Unregister notification failed, continuing shutdown",
            ),
        }

        self.transition(Registration::finish_unregister);
    }

    fn transition<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Registration) -> Result<(), taskrunner_core::CoreError>,
    {
        if let Err(e) = f(&mut self.registration) {
            tracing::error!(error = %e, "Registration state machine rejected transition");
        }
    }
}
