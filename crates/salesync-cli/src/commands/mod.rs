//! CLI subcommands and the state they share

pub mod config;
pub mod drain;
pub mod enqueue;
pub mod failed;
pub mod mirror;
pub mod reconcile;
pub mod retry;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use salesync_cache::{DatabasePool, SqliteEntitySource, SqliteMirrorStore, SqliteSyncRequestQueue};
use salesync_core::config::Config;
use salesync_core::domain::{ChannelId, LocalEntityId, MirrorKey, ViewId};
use salesync_sync::{ReconciliationEngine, SignalDispatcher};

// ============================================================================
// CliContext
// ============================================================================

/// Configuration resolved from `--config` or the default path
pub struct CliContext {
    pub config: Config,
    pub config_path: PathBuf,
    /// False when no file exists and defaults are in effect
    pub config_found: bool,
}

impl CliContext {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Config::default_path);
        let config_found = config_path.exists();
        let config = if config_found {
            Config::load(&config_path).with_context(|| {
                format!("Failed to load configuration from {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        Ok(Self {
            config,
            config_path,
            config_found,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database.path
    }

    /// Opens the state database, creating it when missing
    pub async fn open_stores(&self) -> Result<Stores> {
        Stores::open(self.database_path()).await
    }

    /// Opens the state database only if it already exists
    pub async fn open_existing_stores(&self) -> Result<Option<Stores>> {
        if !self.database_path().exists() {
            return Ok(None);
        }
        self.open_stores().await.map(Some)
    }
}

// ============================================================================
// Stores
// ============================================================================

/// The SQLite-backed stores over one pool
pub struct Stores {
    pub db: DatabasePool,
    pub mirrors: Arc<SqliteMirrorStore>,
    pub queue: Arc<SqliteSyncRequestQueue>,
    pub entities: Arc<SqliteEntitySource>,
}

impl Stores {
    pub async fn open(db_path: &Path) -> Result<Self> {
        let db = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        Ok(Self::from_pool(db))
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let db = DatabasePool::in_memory()
            .await
            .context("Failed to create in-memory database")?;
        Ok(Self::from_pool(db))
    }

    fn from_pool(db: DatabasePool) -> Self {
        let mirrors = Arc::new(SqliteMirrorStore::new(db.pool().clone()));
        let queue = Arc::new(SqliteSyncRequestQueue::new(db.pool().clone()));
        let entities = Arc::new(SqliteEntitySource::new(db.pool().clone()));
        Self {
            db,
            mirrors,
            queue,
            entities,
        }
    }

    pub fn dispatcher(&self) -> SignalDispatcher {
        SignalDispatcher::new(self.mirrors.clone(), self.queue.clone())
    }

    /// Builds an engine with one adapter per configured channel
    pub fn engine(&self, config: &Config) -> Result<ReconciliationEngine> {
        let registry = salesync_channels::registry_from_config(config)?;
        Ok(ReconciliationEngine::new(
            self.mirrors.clone(),
            self.queue.clone(),
            self.entities.clone(),
            registry,
        )
        .with_config(config))
    }
}

// ============================================================================
// Shared arguments
// ============================================================================

/// Addresses one (entity, channel, view) triple
#[derive(Debug, Clone, Args)]
pub struct TripleArgs {
    /// Local entity id
    #[arg(long)]
    pub entity: i64,
    /// Sales channel id
    #[arg(long)]
    pub channel: i64,
    /// Channel view id (omit for the default view)
    #[arg(long)]
    pub view: Option<i64>,
}

impl TripleArgs {
    pub fn entity_id(&self) -> Result<LocalEntityId> {
        Ok(LocalEntityId::new(self.entity)?)
    }

    pub fn channel_id(&self) -> Result<ChannelId> {
        Ok(ChannelId::new(self.channel)?)
    }

    pub fn view_id(&self) -> Result<Option<ViewId>> {
        self.view.map(ViewId::new).transpose().map_err(Into::into)
    }

    pub fn mirror_key(&self) -> Result<MirrorKey> {
        Ok(MirrorKey::new(
            self.entity_id()?,
            self.channel_id()?,
            self.view_id()?,
        ))
    }
}
