//! Job configuration
//!
//! The whole job is described by one immutable [`SyncJobConfig`], loaded
//! once at startup from YAML, adjusted by a few environment overrides and
//! validated. Components receive their own section and never read process
//! state afterwards.

use crate::error::{Error, Result};
use crate::http::{RateLimiterConfig, RetryPolicy};
use crate::sink::BatchLimits;
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Override for `source.base_url`
pub const ENV_BASE_URL: &str = "EVENT_SYNC_BASE_URL";
/// Override for the environment variable holding the API token
pub const ENV_TOKEN_ENV: &str = "EVENT_SYNC_TOKEN_ENV";
/// Override for `run.max_pages`
pub const ENV_MAX_PAGES: &str = "EVENT_SYNC_MAX_PAGES";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete job configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobConfig {
    /// Source API settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Where the API bearer token comes from
    #[serde(default)]
    pub token: TokenConfig,

    /// Retry policy for fetches and sink writes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checkpoint persistence
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Log sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Per-run limits and schedule
    #[serde(default)]
    pub run: RunConfig,

    /// Feeds to synchronize, in order
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
}

impl Default for SyncJobConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            token: TokenConfig::default(),
            retry: RetryConfig::default(),
            checkpoint: CheckpointConfig::default(),
            sink: SinkConfig::default(),
            run: RunConfig::default(),
            feeds: default_feeds(),
        }
    }
}

impl SyncJobConfig {
    /// Load from a YAML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, used when no config file is given
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML without consulting the environment
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_BASE_URL) {
            self.source.base_url = url;
        }
        if let Some(var) = lookup(ENV_TOKEN_ENV) {
            self.token = TokenConfig::Env(var);
        }
        if let Some(pages) = lookup(ENV_MAX_PAGES) {
            self.run.max_pages = pages.trim().parse().map_err(|e| {
                Error::invalid_value(ENV_MAX_PAGES, format!("'{pages}' is not a page count: {e}"))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.base_url)
            .map_err(|e| Error::invalid_value("source.base_url", e.to_string()))?;

        if self.source.page_limit == 0 {
            return Err(Error::invalid_value("source.page_limit", "must be > 0"));
        }
        if self.source.lookback_hours == 0 {
            return Err(Error::invalid_value("source.lookback_hours", "must be > 0"));
        }
        if self.source.timeout_secs == 0 {
            return Err(Error::invalid_value("source.timeout_secs", "must be > 0"));
        }
        if self.run.max_pages == 0 {
            return Err(Error::invalid_value("run.max_pages", "must be > 0"));
        }
        if self.run.interval_secs == 0 {
            return Err(Error::invalid_value("run.interval_secs", "must be > 0"));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(Error::invalid_value(
                "retry.max_backoff_ms",
                "must be >= retry.initial_backoff_ms",
            ));
        }

        match &self.token {
            TokenConfig::Env(var) if var.trim().is_empty() => {
                return Err(Error::missing_field("token.env"));
            }
            TokenConfig::File(path) if path.as_os_str().is_empty() => {
                return Err(Error::missing_field("token.file"));
            }
            _ => {}
        }

        self.sink.validate()?;

        if self.feeds.is_empty() {
            return Err(Error::missing_field("feeds"));
        }
        let mut names = HashSet::new();
        let mut parameters = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(Error::missing_field("feeds[].name"));
            }
            if !feed.path.starts_with('/') {
                return Err(Error::invalid_value(
                    format!("feeds.{}.path", feed.name),
                    "must start with '/'",
                ));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(Error::invalid_value(
                    "feeds",
                    format!("duplicate feed name '{}'", feed.name),
                ));
            }
            // Two feeds sharing a parameter would resume from each other's cursor
            if !parameters.insert(feed.checkpoint.as_str()) {
                return Err(Error::invalid_value(
                    "feeds",
                    format!("duplicate checkpoint parameter '{}'", feed.checkpoint),
                ));
            }
        }

        Ok(())
    }

    /// Look up a feed by name
    pub fn feed(&self, name: &str) -> Result<&FeedConfig> {
        self.feeds
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::config(format!("Unknown feed: {name}")))
    }
}

// ============================================================================
// Source
// ============================================================================

/// Source API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the events API
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Page size sent with time-window seeds
    pub page_limit: u32,
    /// Lookback used on first run, in hours
    pub lookback_hours: u32,
    /// Optional client-side rate limit
    pub rate_limit: Option<RateLimiterConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://events.1password.com".to_string(),
            timeout_secs: 30,
            page_limit: 1000,
            lookback_hours: 24,
            rate_limit: None,
        }
    }
}

impl SourceConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// First-run lookback window
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }
}

// ============================================================================
// Token
// ============================================================================

/// Where the bearer token is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenConfig {
    /// Environment variable name
    Env(String),
    /// File containing the token (e.g. a mounted secret)
    File(PathBuf),
    /// Inline value
    Value(String),
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::Env("OP_EVENTS_API_TOKEN".to_string())
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Retry settings for retryable fetch and write failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff growth
    pub backoff: BackoffType,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff: BackoffType::Exponential,
        }
    }
}

impl RetryConfig {
    /// Build the retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.backoff,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Checkpoint persistence backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointConfig {
    /// Local JSON parameter file
    File {
        /// Path of the parameter file
        path: PathBuf,
    },
    /// One object per parameter in an object store
    ObjectStore {
        /// `s3://`, `r2://`, `gs://`, `az://` or local path
        url: String,
    },
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("event-sync-checkpoints.json"),
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Log sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Destination backend
    pub destination: SinkDestination,
    /// Log group all feeds write into
    pub group: String,
    /// Maximum time span between first and last record of a batch, in hours
    pub max_batch_span_hours: u32,
    /// Maximum records per batch
    pub max_batch_events: usize,
    /// Maximum batch size in bytes, including per-record overhead
    pub max_batch_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        let limits = BatchLimits::default();
        Self {
            destination: SinkDestination::default(),
            group: "op-events-api-signins".to_string(),
            max_batch_span_hours: 24,
            max_batch_events: limits.max_events,
            max_batch_bytes: limits.max_bytes,
        }
    }
}

impl SinkConfig {
    /// Batch limits for the sink writer
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_span: chrono::Duration::hours(i64::from(self.max_batch_span_hours)),
            max_events: self.max_batch_events,
            max_bytes: self.max_batch_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.group.trim().is_empty() {
            return Err(Error::missing_field("sink.group"));
        }
        if self.max_batch_span_hours == 0 {
            return Err(Error::invalid_value("sink.max_batch_span_hours", "must be > 0"));
        }
        if self.max_batch_events == 0 {
            return Err(Error::invalid_value("sink.max_batch_events", "must be > 0"));
        }
        if self.max_batch_bytes == 0 {
            return Err(Error::invalid_value("sink.max_batch_bytes", "must be > 0"));
        }
        if let SinkDestination::Http { url, .. } = &self.destination {
            url::Url::parse(url)
                .map_err(|e| Error::invalid_value("sink.destination.url", e.to_string()))?;
        }
        Ok(())
    }
}

/// Sink backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkDestination {
    /// JSON-lines objects in an object store
    ObjectStore {
        /// `s3://`, `r2://`, `gs://`, `az://` or local path
        url: String,
    },
    /// HTTP log ingest endpoint accepting newline-delimited JSON
    Http {
        /// Ingest URL
        url: String,
        /// Environment variable holding an optional bearer token
        #[serde(default)]
        token_env: Option<String>,
    },
    /// Standard output
    #[default]
    Stdout,
}

// ============================================================================
// Run
// ============================================================================

/// Per-run limits and schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum pages fetched per feed per run
    pub max_pages: usize,
    /// Interval between runs in `schedule` mode, in seconds
    pub interval_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            interval_secs: 600,
        }
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// One source endpoint with its own checkpoint and sink stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed name used in logs and on the command line
    pub name: String,
    /// Endpoint path relative to the source base URL
    pub path: String,
    /// Checkpoint parameter name
    pub checkpoint: String,
    /// Sink stream name
    pub stream: String,
}

fn default_feeds() -> Vec<FeedConfig> {
    vec![FeedConfig {
        name: "signins".to_string(),
        path: "/api/v1/signinattempts".to_string(),
        checkpoint: "op-events-api-cursor".to_string(),
        stream: "op-events-api-signins-stream".to_string(),
    }]
}
