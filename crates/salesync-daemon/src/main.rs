//! Salesync Daemon - Background reconciliation worker
//!
//! This binary runs as a long-lived service and:
//! - Opens the SQLite store shared with the business system
//! - Builds one channel adapter per configured sales channel
//! - Drains the sync request queue with a bounded worker pool
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite stores, the adapter registry and the
//! reconciliation engine together, then hands control to the
//! [`SyncWorker`] loop. The loop is controlled by a `CancellationToken`
//! that is triggered on receipt of SIGTERM or SIGINT; reconciles already
//! running finish before the process exits.
//!
//! The configuration file is read from `$SALESYNC_CONFIG` when set,
//! otherwise from the platform default path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use salesync_cache::{DatabasePool, SqliteEntitySource, SqliteMirrorStore, SqliteSyncRequestQueue};
use salesync_core::config::Config;
use salesync_sync::{ReconciliationEngine, SyncWorker};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "SALESYNC_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the database pool and the worker for the lifetime of the process
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    worker: SyncWorker,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database and builds the engine and worker
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_path = config.database.path.clone();
        let db_pool = DatabasePool::new(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let mirrors = Arc::new(SqliteMirrorStore::new(db_pool.pool().clone()));
        let queue = Arc::new(SqliteSyncRequestQueue::new(db_pool.pool().clone()));
        let entities = Arc::new(SqliteEntitySource::new(db_pool.pool().clone()));

        let registry = salesync_channels::registry_from_config(&config)?;
        if registry.is_empty() {
            warn!("No channels configured; every request will fail with an unknown channel");
        }

        let engine = Arc::new(
            ReconciliationEngine::new(mirrors, queue.clone(), entities, registry)
                .with_config(&config),
        );
        let worker = SyncWorker::new(engine, queue, &config.worker);

        Ok(Self {
            config,
            db_pool,
            worker,
            shutdown,
        })
    }

    /// Runs the worker until shutdown, then closes the pool
    async fn run(&self) -> Result<()> {
        info!(
            channels = self.config.channels.len(),
            concurrency = self.config.worker.concurrency,
            max_attempts = self.config.retry.max_attempts,
            "Salesync daemon running"
        );

        self.worker.run(self.shutdown.clone()).await;

        self.db_pool.close().await;
        info!("Database closed");
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Resolves the configuration path from the environment or the default
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads and validates the configuration
///
/// A missing file yields the defaults; an unreadable or invalid one is an
/// error. Returns whether the file was found.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    let (config, found) = if path.exists() {
        let config = Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        (config, true)
    } else {
        (Config::default(), false)
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let report = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        bail!("Invalid configuration {}: {report}", path.display());
    }

    Ok((config, found))
}

/// Installs the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
///
/// A handler that cannot be installed is logged and never fires; the
/// other signal still stops the daemon.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let (config, found) = load_config(&path)?;

    init_tracing(&config);
    if found {
        info!(config_path = %path.display(), "Loaded configuration");
    } else {
        warn!(config_path = %path.display(), "Configuration file not found, using defaults");
    }

    info!("Salesync daemon starting (salesyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("Salesync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Salesync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
