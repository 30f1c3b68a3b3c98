//! `taskrunner-agent` -- background task runner.
//!
//! Registers with the orchestrating host, reports liveness on a fixed
//! interval, and keeps the configured metadata sources synchronized until
//! stopped with SIGINT/SIGTERM. See [`config`](taskrunner_agent::config)
//! for the environment variables it reads.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskrunner_agent::config::WorkerConfig;
use taskrunner_agent::host::HttpHostClient;
use taskrunner_agent::process::ProcessRegistry;
use taskrunner_agent::shutdown;
use taskrunner_agent::vcs::GitCli;
use taskrunner_agent::worker::WorkerLoop;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = run().await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;

    tracing::info!(
        worker = %config.worker_name,
        host_url = %config.host_url,
        sources = ?config.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "Starting taskrunner-agent",
    );

    let host = HttpHostClient::new(
        config.host_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
    )
    .context("Failed to build host client")?;

    let processes = ProcessRegistry::new();
    let vcs = GitCli::new(config.git_binary.clone(), processes.clone());
    let cancel = shutdown::install_handler();

    let mut worker = WorkerLoop::new(config, Arc::new(host), Arc::new(vcs), processes);
    worker.run(cancel).await?;

    Ok(())
}

/// `RUST_LOG` filters (default `taskrunner_agent=info`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskrunner_agent=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
