//! Engine types
//!
//! Run configuration, state machine positions and run results.

use crate::config::SyncJobConfig;
use crate::error::Error;
use crate::http::RetryPolicy;
use crate::source::{Cursor, Seed};

/// Configuration for one sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum pages fetched before the run yields
    pub max_pages: usize,
    /// Window fetched when no cursor is stored
    pub lookback: chrono::Duration,
    /// Retry policy for fetches and sink writes
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            lookback: chrono::Duration::hours(24),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the run settings from the job configuration
    pub fn from_job(config: &SyncJobConfig) -> Self {
        Self {
            max_pages: config.run.max_pages,
            lookback: config.source.lookback(),
            retry: config.retry.policy(),
        }
    }

    /// Set max pages
    #[must_use]
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    /// Set the first-run lookback window
    #[must_use]
    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Set retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Position in the run state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing read yet
    Start,
    /// Seed for the next fetch is known
    SeedResolved,
    /// A page is in hand
    PageFetched,
    /// The page had no events
    EmptyPage,
    /// The page's events are acknowledged by the sink
    Written,
    /// The page's cursor is persisted
    Checkpointed,
    /// Source reported no more data
    Done,
    /// Run aborted
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::SeedResolved => "seed_resolved",
            Self::PageFetched => "page_fetched",
            Self::EmptyPage => "empty_page",
            Self::Written => "written",
            Self::Checkpointed => "checkpointed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The source has no more data
    Done,
    /// The page budget ran out with data remaining
    PageLimitReached,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pages fetched
    pub pages_fetched: usize,
    /// Pages without events
    pub empty_pages: usize,
    /// Events acknowledged by the sink
    pub events_written: usize,
    /// Sink batches submitted
    pub batches_written: usize,
    /// Checkpoint overwrites
    pub checkpoints_advanced: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page
    pub fn add_page(&mut self, events: usize) {
        self.pages_fetched += 1;
        if events == 0 {
            self.empty_pages += 1;
        }
    }

    /// Add a confirmed write
    pub fn add_write(&mut self, events: usize, batches: usize) {
        self.events_written += events;
        self.batches_written += batches;
    }

    /// Add a checkpoint advance
    pub fn add_checkpoint(&mut self) {
        self.checkpoints_advanced += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Feed name
    pub feed: String,
    /// How the run ended
    pub outcome: SyncOutcome,
    /// Seed of the first fetch
    pub seed: Seed,
    /// Cursor persisted last during this run
    pub last_checkpoint: Option<Cursor>,
    /// Counters
    pub stats: SyncStats,
}

/// A failed run, with the progress made before the failure
#[derive(Debug, thiserror::Error)]
#[error("feed {feed} failed in state {state}: {error}")]
pub struct SyncFailure {
    /// Feed name
    pub feed: String,
    /// State the run was in when the error occurred
    pub state: RunState,
    /// Seed of the first fetch, if it was resolved
    pub seed: Option<Seed>,
    /// Cursor persisted last during this run; the next run resumes here
    pub last_checkpoint: Option<Cursor>,
    /// Counters up to the failure
    pub stats: SyncStats,
    /// The error that stopped the run
    #[source]
    pub error: Error,
}

impl SyncFailure {
    /// Whether some pages were committed before the failure
    pub fn is_partial(&self) -> bool {
        self.stats.checkpoints_advanced > 0
    }
}
