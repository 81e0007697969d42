//! scrollcache - terminal host for the offline chapter cache.
//!
//! Each invocation builds a worker over the on-disk cache, plays the page
//! side of one interaction (install, read, fetch, admin message) and exits.

mod cli;
mod commands;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scrollcache_core::{DiskStorage, HttpNetwork, Network, OfflineNetwork, ServiceWorker, WorkerConfig};

use cli::Cli;

// ============================================================================
// Constants
// ============================================================================

/// File name prefix of the rolling log written with `--log-dir`
const LOG_FILE_PREFIX: &str = "scrollcache.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=scrollcache_core=debug).
/// The returned guard flushes the file writer on drop and must outlive main.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> Result<WorkerConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::load_default()?,
    };
    if let Some(origin) = &cli.origin {
        config.scope = origin.clone();
    }
    Ok(config)
}

fn build_worker(cli: &Cli) -> Result<ServiceWorker> {
    let config = load_config(cli)?;
    let cache_dir = match &cli.cache_dir {
        Some(dir) => dir.clone(),
        None => WorkerConfig::cache_dir()?,
    };
    let storage = Arc::new(match config.storage_quota_bytes {
        Some(quota) => DiskStorage::with_quota(&cache_dir, quota),
        None => DiskStorage::new(&cache_dir),
    });
    let network: Arc<dyn Network> = if cli.offline {
        Arc::new(OfflineNetwork)
    } else {
        Arc::new(HttpNetwork::new().context("Failed to build HTTP client")?)
    };

    info!(scope = %config.scope, cache_dir = %cache_dir.display(), offline = cli.offline, "Starting worker");
    ServiceWorker::new(config, storage, network)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let worker = Arc::new(build_worker(&cli)?);
    let result = commands::run(&worker, cli.command).await;

    // Let background refreshes land before the process exits
    worker.settle().await;
    result
}
