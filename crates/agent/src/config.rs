//! Worker configuration loaded from environment variables.
//!
//! | Variable                  | Required | Default                 |
//! |---------------------------|----------|-------------------------|
//! | `HOST_URL`                | yes      | --                      |
//! | `HOST_API_KEY`            | no       | --                      |
//! | `WORKER_NAME`             | no       | `HOSTNAME` / `taskrunner` |
//! | `HEARTBEAT_INTERVAL_SECS` | no       | `5`                     |
//! | `POLL_DELAY_SECS`         | no       | `5`                     |
//! | `REQUEST_TIMEOUT_SECS`    | no       | `30`                    |
//! | `UNREGISTER_TIMEOUT_SECS` | no       | `10`                    |
//! | `SHUTDOWN_GRACE_SECS`     | no       | `30`                    |
//! | `CLONE_ROOT`              | no       | `./data/sources`        |
//! | `PROCESSING_ROOT`         | no       | `./data/processing`     |
//! | `SYNC_INTERVAL_SECS`      | no       | `3600` (`0` disables)   |
//! | `SYNC_SOURCES`            | no       | all built-in sources    |
//! | `GIT_BINARY`              | no       | `git`                   |

use std::path::PathBuf;
use std::time::Duration;

use taskrunner_core::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use taskrunner_core::sources::{select_builtin_sources, SourceDescriptor};
use taskrunner_core::CoreError;

const DEFAULT_WORKER_NAME: &str = "taskrunner";
const DEFAULT_POLL_DELAY_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UNREGISTER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3600;
const DEFAULT_CLONE_ROOT: &str = "./data/sources";
const DEFAULT_PROCESSING_ROOT: &str = "./data/processing";
const DEFAULT_GIT_BINARY: &str = "git";

/// Read-only worker configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the orchestrating host, without a trailing slash.
    pub host_url: String,
    pub api_key: Option<String>,
    pub worker_name: String,
    /// Reported to the host; `HOSTNAME` or the worker name.
    pub hostname: String,
    pub heartbeat_interval: Duration,
    pub poll_delay: Duration,
    pub request_timeout: Duration,
    pub unregister_timeout: Duration,
    /// How long in-flight synchronizations may run after shutdown begins.
    pub shutdown_grace: Duration,
    pub clone_root: PathBuf,
    pub processing_root: PathBuf,
    /// `None` disables scheduled synchronization.
    pub sync_interval: Option<Duration>,
    pub sources: Vec<SourceDescriptor>,
    pub git_binary: String,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error(transparent)]
    Source(#[from] CoreError),
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host_url = get("HOST_URL")
            .ok_or(ConfigError::Missing("HOST_URL"))?
            .trim_end_matches('/')
            .to_string();
        if !host_url.starts_with("http://") && !host_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "HOST_URL",
                reason: format!("'{host_url}' is not an http(s) URL"),
            });
        }

        let worker_name = get("WORKER_NAME")
            .or_else(|| get("HOSTNAME"))
            .unwrap_or_else(|| DEFAULT_WORKER_NAME.to_string());
        let hostname = get("HOSTNAME").unwrap_or_else(|| worker_name.clone());

        let heartbeat_interval = non_zero_secs(
            "HEARTBEAT_INTERVAL_SECS",
            parse_secs(
                &get,
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            )?,
        )?;
        let poll_delay = non_zero_secs(
            "POLL_DELAY_SECS",
            parse_secs(&get, "POLL_DELAY_SECS", DEFAULT_POLL_DELAY_SECS)?,
        )?;
        let request_timeout = non_zero_secs(
            "REQUEST_TIMEOUT_SECS",
            parse_secs(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        )?;
        let unregister_timeout = Duration::from_secs(parse_secs(
            &get,
            "UNREGISTER_TIMEOUT_SECS",
            DEFAULT_UNREGISTER_TIMEOUT_SECS,
        )?);
        let shutdown_grace = Duration::from_secs(parse_secs(
            &get,
            "SHUTDOWN_GRACE_SECS",
            DEFAULT_SHUTDOWN_GRACE_SECS,
        )?);

        let sync_interval = match parse_secs(
            &get,
            "SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
        )? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let clone_root =
            PathBuf::from(get("CLONE_ROOT").unwrap_or_else(|| DEFAULT_CLONE_ROOT.to_string()));
        let processing_root = PathBuf::from(
            get("PROCESSING_ROOT").unwrap_or_else(|| DEFAULT_PROCESSING_ROOT.to_string()),
        );
        if clone_root == processing_root {
            return Err(ConfigError::Invalid {
                var: "PROCESSING_ROOT",
                reason: "must differ from CLONE_ROOT".to_string(),
            });
        }

        let source_names: Vec<String> = get("SYNC_SOURCES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let sources = select_builtin_sources(&source_names, &clone_root, &processing_root)?;

        Ok(Self {
            host_url,
            api_key: get("HOST_API_KEY"),
            worker_name,
            hostname,
            heartbeat_interval,
            poll_delay,
            request_timeout,
            unregister_timeout,
            shutdown_grace,
            clone_root,
            processing_root,
            sync_interval,
            sources,
            git_binary: get("GIT_BINARY").unwrap_or_else(|| DEFAULT_GIT_BINARY.to_string()),
        })
    }
}

fn parse_secs<F>(get: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("'{raw}' is not a whole number of seconds"),
        }),
    }
}

fn non_zero_secs(var: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
