#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, post};
use axum::{Json, Router};
use taskrunner_agent::config::WorkerConfig;
use taskrunner_agent::host::{
    HostClient, HostError, RegistrationRequest, RegistrationResponse, API_KEY_HEADER,
};
use taskrunner_agent::vcs::{VcsError, VersionControl};
use taskrunner_core::types::WorkerIdentity;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Build a `WorkerConfig` rooted at `root`, with scheduled syncing off.
///
/// `overrides` replace or add environment variables.
pub fn test_config(root: &Path, overrides: &[(&str, &str)]) -> WorkerConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("HOST_URL".to_string(), "http://127.0.0.1:9".to_string()),
        ("WORKER_NAME".to_string(), "test-runner".to_string()),
        ("SYNC_INTERVAL_SECS".to_string(), "0".to_string()),
        ("SHUTDOWN_GRACE_SECS".to_string(), "1".to_string()),
        (
            "CLONE_ROOT".to_string(),
            root.join("clones").to_string_lossy().into_owned(),
        ),
        (
            "PROCESSING_ROOT".to_string(),
            root.join("processing").to_string_lossy().into_owned(),
        ),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    WorkerConfig::from_lookup(|key| vars.get(key).cloned()).expect("test config should load")
}

// ---------------------------------------------------------------------------
// Fake orchestrating host
// ---------------------------------------------------------------------------

pub const FAKE_WORKER_ID: &str = "worker-1";

/// In-memory [`HostClient`] that counts calls and fails on demand.
#[derive(Default)]
pub struct FakeHost {
    register_calls: AtomicUsize,
    heartbeat_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    pub reject_registration: AtomicBool,
    pub fail_heartbeats: AtomicBool,
    pub fail_unregister: AtomicBool,
    pub hang_unregister: AtomicBool,
}

impl FakeHost {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        let host = Self::default();
        host.reject_registration.store(true, Ordering::SeqCst);
        Arc::new(host)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeat_calls(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

fn unavailable() -> HostError {
    HostError::Api {
        status: 503,
        body: "host unavailable".to_string(),
    }
}

#[async_trait::async_trait]
impl HostClient for FakeHost {
    async fn register(&self, _request: &RegistrationRequest) -> Result<WorkerIdentity, HostError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_registration.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(WorkerIdentity::new(FAKE_WORKER_ID))
    }

    async fn heartbeat(&self, _identity: &WorkerIdentity) -> Result<(), HostError> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    async fn unregister(&self, _identity: &WorkerIdentity) -> Result<(), HostError> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_unregister.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake version control
// ---------------------------------------------------------------------------

/// Scripted [`VersionControl`]: writes `files` into the clone directory
/// and reports `changed`.
#[derive(Default)]
pub struct FakeVcs {
    calls: AtomicUsize,
    changed: AtomicBool,
    files: Mutex<Vec<(PathBuf, String)>>,
    failure: Mutex<Option<String>>,
    /// When set, each call waits for a notification before returning.
    gate: Option<Arc<Notify>>,
}

impl FakeVcs {
    /// Upstream that changes on every call and contains `files`.
    pub fn changing(files: &[(&str, &str)]) -> Arc<Self> {
        let vcs = Self::default();
        vcs.changed.store(true, Ordering::SeqCst);
        vcs.set_files(files);
        Arc::new(vcs)
    }

    pub fn unchanged() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(stderr: &str) -> Arc<Self> {
        let vcs = Self::default();
        *vcs.failure.lock().unwrap() = Some(stderr.to_string());
        Arc::new(vcs)
    }

    /// Changing upstream whose calls block until `gate` is notified.
    pub fn gated(files: &[(&str, &str)], gate: Arc<Notify>) -> Arc<Self> {
        let vcs = Self {
            gate: Some(gate),
            ..Self::default()
        };
        vcs.changed.store(true, Ordering::SeqCst);
        vcs.set_files(files);
        Arc::new(vcs)
    }

    pub fn set_changed(&self, changed: bool) {
        self.changed.store(changed, Ordering::SeqCst);
    }

    pub fn set_files(&self, files: &[(&str, &str)]) {
        *self.files.lock().unwrap() = files
            .iter()
            .map(|(path, contents)| (PathBuf::from(path), contents.to_string()))
            .collect();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VersionControl for FakeVcs {
    async fn clone_or_refresh(
        &self,
        _url: &str,
        _git_ref: &str,
        local_dir: &Path,
    ) -> Result<bool, VcsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(stderr) = self.failure.lock().unwrap().clone() {
            return Err(VcsError::Command {
                command: "fetch --depth 1 origin main".to_string(),
                code: 128,
                stderr,
            });
        }

        let changed = self.changed.load(Ordering::SeqCst);
        if changed {
            let files = self.files.lock().unwrap().clone();
            for (relative, contents) in files {
                let path = local_dir.join(relative);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, contents).unwrap();
            }
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// HTTP mock host
// ---------------------------------------------------------------------------

pub const MOCK_WORKER_ID: &str = "worker-7";

/// Everything the mock host has received.
#[derive(Clone, Default)]
pub struct MockHostState {
    pub registrations: Arc<Mutex<Vec<RegistrationRequest>>>,
    pub heartbeats: Arc<Mutex<Vec<String>>>,
    pub unregistrations: Arc<Mutex<Vec<String>>>,
    pub api_keys: Arc<Mutex<Vec<Option<String>>>>,
    pub fail_heartbeats: Arc<AtomicBool>,
}

impl MockHostState {
    fn record_key(&self, headers: &HeaderMap) {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.api_keys.lock().unwrap().push(key);
    }
}

async fn mock_register(
    State(state): State<MockHostState>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Json<RegistrationResponse> {
    state.record_key(&headers);
    state.registrations.lock().unwrap().push(request);
    Json(RegistrationResponse {
        worker_id: MOCK_WORKER_ID.to_string(),
    })
}

async fn mock_heartbeat(
    State(state): State<MockHostState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    state.record_key(&headers);
    if state.fail_heartbeats.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.heartbeats.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn mock_unregister(
    State(state): State<MockHostState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    state.record_key(&headers);
    state.unregistrations.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

/// Serve a mock orchestrating host on an ephemeral port and return its
/// base URL.
pub async fn spawn_mock_host(state: MockHostState) -> String {
    let app = Router::new()
        .route("/api/v1/workers/register", post(mock_register))
        .route("/api/v1/workers/{id}/heartbeat", post(mock_heartbeat))
        .route("/api/v1/workers/{id}", delete(mock_unregister))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock host server");
    });

    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

/// File names directly inside `dir`, sorted. Empty if `dir` is missing.
pub fn list_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
