//! Orchestrating host client.
//!
//! [`HostClient`] is the narrow contract the worker needs from the host:
//! register, heartbeat, unregister. [`HttpHostClient`] implements it as
//! JSON over HTTP using [`reqwest`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskrunner_core::types::WorkerIdentity;

/// Header carrying the host API key, when one is configured.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Metadata sent with a registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub hostname: String,
    /// Unique per process; lets the host tell restarts apart.
    pub instance_id: String,
    pub version: String,
    pub pid: u32,
    /// Names of the sources this worker can synchronize.
    pub capabilities: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Host reply to a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub worker_id: String,
}

/// Body of a liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub timestamp: DateTime<Utc>,
}

/// Errors from the host client.
///
/// Callers treat every variant as a plain failure.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The host returned a non-2xx status code.
    #[error("Host API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The host answered but omitted or blanked the worker id.
    #[error("Host returned an empty worker id")]
    EmptyIdentity,

    /// The call did not complete in the allotted time.
    #[error("Host call timed out after {0:?}")]
    Timeout(Duration),
}

/// Calls the worker makes against the orchestrating host.
#[async_trait::async_trait]
pub trait HostClient: Send + Sync {
    async fn register(&self, request: &RegistrationRequest) -> Result<WorkerIdentity, HostError>;

    async fn heartbeat(&self, identity: &WorkerIdentity) -> Result<(), HostError>;

    async fn unregister(&self, identity: &WorkerIdentity) -> Result<(), HostError>;
}

/// HTTP client for the orchestrating host.
pub struct HttpHostClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpHostClient {
    /// Create a client with its own connection pool and a per-request
    /// timeout.
    ///
    /// * `base_url` - e.g. `http://host:5198`, without trailing slash.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on a success status, otherwise a
    /// [`HostError::Api`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, HostError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(HostError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl HostClient for HttpHostClient {
    /// `POST /api/v1/workers/register`.
    async fn register(&self, request: &RegistrationRequest) -> Result<WorkerIdentity, HostError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/api/v1/workers/register", self.base_url)),
            )
            .json(request)
            .send()
            .await?;

        let body: RegistrationResponse = Self::ensure_success(response).await?.json().await?;
        let worker_id = body.worker_id.trim();
        if worker_id.is_empty() {
            return Err(HostError::EmptyIdentity);
        }
        Ok(WorkerIdentity::new(worker_id))
    }

    /// `POST /api/v1/workers/{id}/heartbeat`.
    async fn heartbeat(&self, identity: &WorkerIdentity) -> Result<(), HostError> {
        let body = HeartbeatRequest {
            timestamp: Utc::now(),
        };
        let response = self
            .authorize(self.client.post(format!(
                "{}/api/v1/workers/{}/heartbeat",
                self.base_url, identity
            )))
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// `DELETE /api/v1/workers/{id}`.
    async fn unregister(&self, identity: &WorkerIdentity) -> Result<(), HostError> {
        let response = self
            .authorize(
                self.client
                    .delete(format!("{}/api/v1/workers/{}", self.base_url, identity)),
            )
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
