//! Configuration module for Salesync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ChannelType, RetryPolicy};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Salesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub channels: Vec<ChannelConfig>,
}

/// State database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database holding mirror records and sync requests.
    pub path: PathBuf,
}

/// Sync worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of reconciles running in parallel.
    pub concurrency: usize,
    /// Milliseconds between queue polls.
    pub poll_interval_ms: u64,
    /// Maximum number of requests fetched per poll.
    pub batch_size: u32,
    /// Seconds a mirror lease stays valid before another worker may steal it.
    pub lease_ttl_secs: u64,
    /// Lease owner name; defaults to a per-process identifier when unset.
    pub worker_id: Option<String>,
}

/// Transient failure retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Transient failures after which a sync request becomes failed.
    pub max_attempts: u32,
    /// Delay after the first transient failure (seconds).
    pub base_delay_secs: u64,
    /// Upper bound of the backoff delay (seconds).
    pub max_delay_secs: u64,
}

/// Outbound HTTP settings shared by all channel clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Total request timeout (seconds).
    pub timeout_secs: u64,
    /// TCP connect timeout (seconds).
    pub connect_timeout_secs: u64,
    /// Longest wait for a rate-limit token before a call is deferred (seconds).
    pub rate_limit_wait_secs: u64,
    pub user_agent: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// One configured sales channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub channel_type: ChannelType,
    /// API root, e.g. `https://sellingpartnerapi-eu.amazon.com`.
    pub base_url: String,
    /// Bearer token / API key. Prefer `access_token_env` outside of tests.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Name of the environment variable holding the access token.
    #[serde(default)]
    pub access_token_env: Option<String>,
    /// Channel account: Amazon seller id, QuickBooks realm id, Shopify location.
    #[serde(default)]
    pub account: Option<String>,
    /// Remote code of each view: Amazon marketplace id, eBay marketplace,
    /// Magento store code, Shein site.
    #[serde(default)]
    pub views: BTreeMap<i64, String>,
    /// Remote code used when a request addresses the default view.
    #[serde(default)]
    pub default_view: Option<String>,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    60
}

impl ChannelConfig {
    pub fn new(id: ChannelId, channel_type: ChannelType, base_url: impl Into<String>) -> Self {
        Self {
            id,
            channel_type,
            base_url: base_url.into(),
            access_token: None,
            access_token_env: None,
            account: None,
            views: BTreeMap::new(),
            default_view: None,
            requests_per_minute: default_requests_per_minute(),
        }
    }

    /// Returns the access token, reading `access_token_env` when no inline token is set.
    pub fn resolve_access_token(&self) -> Option<String> {
        self.access_token.clone().or_else(|| {
            self.access_token_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|token| !token.is_empty())
        })
    }

    /// Remote code for `view`, falling back to `default_view` for the default view.
    pub fn view_code(&self, view: Option<i64>) -> Option<&str> {
        match view {
            Some(id) => self.views.get(&id).map(String::as_str),
            None => self.default_view.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/salesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("salesync")
            .join("config.yaml")
    }

    /// Looks up a channel by id.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("salesync")
                .join("salesync.db"),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            batch_size: 50,
            lease_ttl_secs: 120,
            worker_id: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 1,
            max_delay_secs: 300,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            rate_limit_wait_secs: 10,
            user_agent: format!("salesync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl RetryConfig {
    /// Converts the section into the domain retry policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.base_delay_secs),
            Duration::from_secs(self.max_delay_secs),
        )
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_secs)
    }

    /// Longest time one push may spend on the network, rate-limit waits included
    pub fn max_push_duration_secs(&self) -> u64 {
        MAX_CALLS_PER_PUSH * (self.timeout_secs + self.rate_limit_wait_secs)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"worker.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
/// Most HTTP calls an adapter makes for one push (QuickBooks reads before it writes)
pub const MAX_CALLS_PER_PUSH: u64 = 2;

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- database ---
        if self.database.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("database.path", "must not be empty"));
        }

        // --- worker ---
        if self.worker.concurrency == 0 {
            errors.push(ValidationError::new(
                "worker.concurrency",
                "must be greater than 0",
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                "worker.poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.worker.batch_size == 0 {
            errors.push(ValidationError::new(
                "worker.batch_size",
                "must be greater than 0",
            ));
        }
        if self.worker.lease_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "worker.lease_ttl_secs",
                "must be greater than 0",
            ));
        }
        if self.worker.lease_ttl_secs <= self.http.max_push_duration_secs() {
            errors.push(ValidationError::new(
                "worker.lease_ttl_secs",
                format!(
                    "must exceed {}s ({MAX_CALLS_PER_PUSH} calls of http.timeout_secs \
                     plus http.rate_limit_wait_secs) so a lease outlives its push",
                    self.http.max_push_duration_secs()
                ),
            ));
        }

        // --- retry ---
        if self.retry.max_attempts == 0 {
            errors.push(ValidationError::new(
                "retry.max_attempts",
                "must be greater than 0",
            ));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            errors.push(ValidationError::new(
                "retry.max_delay_secs",
                format!(
                    "must be >= retry.base_delay_secs ({})",
                    self.retry.base_delay_secs
                ),
            ));
        }

        // --- http ---
        if self.http.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "http.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.http.connect_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "http.connect_timeout_secs",
                "must be greater than 0",
            ));
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        // --- channels ---
        let mut seen = std::collections::HashSet::new();
        for (index, channel) in self.channels.iter().enumerate() {
            let prefix = format!("channels[{index}]");
            if !seen.insert(channel.id) {
                errors.push(ValidationError::new(
                    format!("{prefix}.id"),
                    format!("duplicate channel id {}", channel.id),
                ));
            }
            match url::Url::parse(&channel.base_url) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                Ok(parsed) => errors.push(ValidationError::new(
                    format!("{prefix}.base_url"),
                    format!("unsupported scheme '{}'", parsed.scheme()),
                )),
                Err(e) => errors.push(ValidationError::new(
                    format!("{prefix}.base_url"),
                    format!("invalid URL '{}': {e}", channel.base_url),
                )),
            }
            if channel.requests_per_minute == 0 {
                errors.push(ValidationError::new(
                    format!("{prefix}.requests_per_minute"),
                    "must be greater than 0",
                ));
            }
            if channel.views.keys().any(|view| *view <= 0) {
                errors.push(ValidationError::new(
                    format!("{prefix}.views"),
                    "view ids must be positive",
                ));
            }
            let needs_account = matches!(
                channel.channel_type,
                ChannelType::Amazon | ChannelType::QuickBooks
            );
            if needs_account && channel.account.is_none() {
                errors.push(ValidationError::new(
                    format!("{prefix}.account"),
                    format!("required for {} channels", channel.channel_type),
                ));
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    pub fn worker_concurrency(mut self, n: usize) -> Self {
        self.config.worker.concurrency = n;
        self
    }

    pub fn worker_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.worker.poll_interval_ms = ms;
        self
    }

    pub fn worker_batch_size(mut self, n: u32) -> Self {
        self.config.worker.batch_size = n;
        self
    }

    pub fn worker_lease_ttl_secs(mut self, secs: u64) -> Self {
        self.config.worker.lease_ttl_secs = secs;
        self
    }

    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.config.worker.worker_id = Some(id.into());
        self
    }

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry.base_delay_secs = secs;
        self
    }

    pub fn retry_max_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry.max_delay_secs = secs;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http.timeout_secs = secs;
        self
    }

    pub fn http_rate_limit_wait_secs(mut self, secs: u64) -> Self {
        self.config.http.rate_limit_wait_secs = secs;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.config.channels.push(channel);
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
