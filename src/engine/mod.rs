//! Execution engine module
//!
//! Drives the fetch, write, checkpoint loop for one feed.
//!
//! # Overview
//!
//! One run walks the state machine
//!
//! ```text
//! START -> SEED_RESOLVED -> PAGE_FETCHED -> {EMPTY_PAGE | WRITTEN} -> CHECKPOINTED -> {next page | DONE}
//! ```
//!
//! with `FAILED` reachable from every state. A page's cursor is persisted
//! only after the sink acknowledged every event of that page, so an abort at
//! any point resumes from the last acknowledged page on the next run.
//!
//! Fetches and sink writes are retried per [`SyncConfig::retry`] when the
//! error is retryable. Checkpoint reads and writes are never retried; a read
//! that is not an explicit "not found" fails the run before anything is
//! fetched.

mod types;

pub use types::{RunState, SyncConfig, SyncFailure, SyncOutcome, SyncReport, SyncStats};

use crate::checkpoint::CheckpointStore;
use crate::error::Result;
use crate::sink::SinkWriter;
use crate::source::{Cursor, Page, Seed, SourceClient};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Progress of the run in flight
#[derive(Debug)]
struct Progress {
    state: RunState,
    seed: Option<Seed>,
    last_checkpoint: Option<Cursor>,
    stats: SyncStats,
}

/// Sync engine for one feed
pub struct SyncEngine {
    feed: String,
    source: Arc<dyn SourceClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: SinkWriter,
    config: SyncConfig,
    clock: Clock,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        feed: impl Into<String>,
        source: Arc<dyn SourceClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: SinkWriter,
    ) -> Self {
        Self {
            feed: feed.into(),
            source,
            checkpoints,
            sink,
            config: SyncConfig::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock used for the first-run window
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Feed name
    pub fn feed(&self) -> &str {
        &self.feed
    }

    /// Sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run until the source is drained, the page budget is spent or an
    /// unrecoverable error occurs
    pub async fn run(&self) -> std::result::Result<SyncReport, SyncFailure> {
        let start = Instant::now();
        let mut progress = Progress {
            state: RunState::Start,
            seed: None,
            last_checkpoint: None,
            stats: SyncStats::new(),
        };

        let result = match self.resolve_seed(&mut progress).await {
            Ok(seed) => self
                .drive(&mut progress, seed.clone())
                .await
                .map(|outcome| (outcome, seed)),
            Err(error) => Err(error),
        };
        progress
            .stats
            .set_duration(start.elapsed().as_millis() as u64);

        match result {
            Ok((outcome, seed)) => Ok(SyncReport {
                feed: self.feed.clone(),
                outcome,
                seed,
                last_checkpoint: progress.last_checkpoint,
                stats: progress.stats,
            }),
            Err(error) => {
                debug!(feed = %self.feed, from = %progress.state, to = %RunState::Failed, "Transition");
                Err(SyncFailure {
                    feed: self.feed.clone(),
                    state: progress.state,
                    seed: progress.seed,
                    last_checkpoint: progress.last_checkpoint,
                    stats: progress.stats,
                    error,
                })
            }
        }
    }

    async fn resolve_seed(&self, progress: &mut Progress) -> Result<Seed> {
        let stored = self.checkpoints.get_cursor().await?;
        let seed = Seed::resolve(stored, (self.clock)(), self.config.lookback);
        info!(
            feed = %self.feed,
            checkpoint = %self.checkpoints.describe(),
            seed = %seed,
            "Starting sync"
        );
        progress.seed = Some(seed.clone());
        self.transition(progress, RunState::SeedResolved);
        Ok(seed)
    }

    async fn drive(&self, progress: &mut Progress, mut seed: Seed) -> Result<SyncOutcome> {
        loop {
            if progress.stats.pages_fetched >= self.config.max_pages {
                info!(
                    feed = %self.feed,
                    max_pages = self.config.max_pages,
                    "Page limit reached, resuming next run"
                );
                return Ok(SyncOutcome::PageLimitReached);
            }

            let page = self
                .config
                .retry
                .run("fetch page", || self.source.fetch_page(&seed))
                .await?;
            progress.stats.add_page(page.len());
            debug!(
                feed = %self.feed,
                page = progress.stats.pages_fetched,
                events = page.len(),
                has_more = page.has_more,
                "Page fetched"
            );
            self.transition(progress, RunState::PageFetched);

            let Some(cursor) = self.process_page(progress, &page).await? else {
                self.transition(progress, RunState::Done);
                return Ok(SyncOutcome::Done);
            };

            if !page.has_more {
                self.transition(progress, RunState::Done);
                return Ok(SyncOutcome::Done);
            }

            seed = Seed::Cursor(cursor);
            self.transition(progress, RunState::SeedResolved);
        }
    }

    /// Write and checkpoint one page; `None` when there was nothing to record
    async fn process_page(&self, progress: &mut Progress, page: &Page) -> Result<Option<Cursor>> {
        if page.is_empty() {
            self.transition(progress, RunState::EmptyPage);
            if !page.has_more {
                return Ok(None);
            }
            let cursor = page.require_cursor()?.clone();
            self.checkpoint(progress, &cursor).await?;
            return Ok(Some(cursor));
        }

        // Cursor must be known before anything reaches the sink
        let cursor = page.require_cursor()?.clone();

        let batches = self
            .sink
            .write_batch(&page.events, &self.config.retry)
            .await?;
        progress.stats.add_write(page.len(), batches);
        debug!(
            feed = %self.feed,
            sink = self.sink.sink_name(),
            events = page.len(),
            batches,
            "Page written"
        );
        self.transition(progress, RunState::Written);

        self.checkpoint(progress, &cursor).await?;
        Ok(Some(cursor))
    }

    async fn checkpoint(&self, progress: &mut Progress, cursor: &Cursor) -> Result<()> {
        self.checkpoints.set_cursor(cursor).await?;
        progress.stats.add_checkpoint();
        progress.last_checkpoint = Some(cursor.clone());
        info!(
            feed = %self.feed,
            page = progress.stats.pages_fetched,
            cursor = %cursor,
            "Checkpoint advanced"
        );
        self.transition(progress, RunState::Checkpointed);
        Ok(())
    }

    fn transition(&self, progress: &mut Progress, to: RunState) {
        debug!(feed = %self.feed, from = %progress.state, to = %to, "Transition");
        progress.state = to;
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("feed", &self.feed)
            .field("checkpoints", &self.checkpoints.describe())
            .field("sink", &self.sink)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
