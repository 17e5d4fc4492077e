//! CLI runner - executes commands

use crate::auth::{provider_from_config, TokenProvider};
use crate::checkpoint::checkpoint_store;
use crate::cli::commands::{Cli, Commands};
use crate::config::{FeedConfig, SyncJobConfig};
use crate::engine::{SyncConfig, SyncEngine, SyncFailure, SyncOutcome};
use crate::error::{Error, Result};
use crate::sink::{log_sink, SinkWriter};
use crate::source::EventsApiClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { feed } => {
                let config = self.load_config()?;
                run_job(&config, feed.as_deref()).await
            }
            Commands::Schedule { interval } => {
                let config = self.load_config()?;
                let secs = interval.unwrap_or(config.run.interval_secs);
                if secs == 0 {
                    return Err(Error::invalid_value("interval", "must be > 0"));
                }
                self.schedule(&config, Duration::from_secs(secs)).await
            }
            Commands::Checkpoint { feed } => {
                let config = self.load_config()?;
                self.checkpoint(&config, feed.as_deref()).await
            }
            Commands::Validate => self.validate(),
        }
    }

    /// Load configuration from the file, or defaults plus environment
    fn load_config(&self) -> Result<SyncJobConfig> {
        match &self.cli.config {
            Some(path) => SyncJobConfig::load(path),
            None => SyncJobConfig::from_env(),
        }
    }

    /// Run the job every `every` until Ctrl-C
    async fn schedule(&self, config: &SyncJobConfig, every: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval(every);
        // Runs never overlap; a run longer than the interval skips ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = every.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = run_job(config, None).await {
                        error!(error = %e, "Scheduled run failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping scheduler");
                    return Ok(());
                }
            }
        }
    }

    /// Print the stored cursor of each selected feed
    async fn checkpoint(&self, config: &SyncJobConfig, only: Option<&str>) -> Result<()> {
        for feed in select_feeds(config, only)? {
            let store = checkpoint_store(&config.checkpoint, &feed.checkpoint)?;
            let cursor = store.get_cursor().await?;
            println!(
                "{}\t{}\t{}",
                feed.name,
                feed.checkpoint,
                cursor.as_ref().map_or("<none>", |c| c.as_str())
            );
        }
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let feeds: Vec<&str> = config.feeds.iter().map(|f| f.name.as_str()).collect();
        println!(
            "Configuration is valid: {} feed(s) [{}] from {}",
            feeds.len(),
            feeds.join(", "),
            config.source.base_url
        );
        Ok(())
    }
}

fn select_feeds<'a>(config: &'a SyncJobConfig, only: Option<&str>) -> Result<Vec<&'a FeedConfig>> {
    match only {
        Some(name) => Ok(vec![config.feed(name)?]),
        None => Ok(config.feeds.iter().collect()),
    }
}

/// Assemble the engine for one feed from the job configuration
pub fn build_engine(
    config: &SyncJobConfig,
    feed: &FeedConfig,
    token: Arc<dyn TokenProvider>,
) -> Result<SyncEngine> {
    let source = EventsApiClient::from_config(&config.source, &feed.path, token)?;
    let checkpoints = checkpoint_store(&config.checkpoint, &feed.checkpoint)?;
    let sink = SinkWriter::new(log_sink(&config.sink, &feed.stream)?, config.sink.limits());

    Ok(
        SyncEngine::new(&feed.name, Arc::new(source), checkpoints, sink)
            .with_config(SyncConfig::from_job(config)),
    )
}

/// Log a failed run; decode failures carry the offending payload
fn log_failure(failure: &SyncFailure) {
    let outcome = if failure.is_partial() {
        "partial failure"
    } else {
        "failed"
    };
    error!(
        feed = %failure.feed,
        state = %failure.state,
        kind = %failure.error.kind(),
        error = %failure.error,
        payload = failure.error.payload(),
        pages = failure.stats.pages_fetched,
        events = failure.stats.events_written,
        cursor = failure.last_checkpoint.as_ref().map(|c| c.as_str()),
        "Sync {outcome}"
    );
}

/// One invocation: run the selected feeds in turn
///
/// A failing feed does not stop the others. Returns `Error::RunFailed` when
/// any feed failed.
pub async fn run_job(config: &SyncJobConfig, only: Option<&str>) -> Result<()> {
    let feeds = select_feeds(config, only)?;
    // One token fetch per invocation, shared by all feeds
    let token = provider_from_config(&config.token);

    let mut failed = 0;
    for feed in &feeds {
        let engine = match build_engine(config, feed, token.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                error!(feed = %feed.name, error = %e, "Sync failed: could not start");
                failed += 1;
                continue;
            }
        };

        match engine.run().await {
            Ok(report) => {
                let stats = &report.stats;
                match report.outcome {
                    SyncOutcome::Done => info!(
                        feed = %report.feed,
                        pages = stats.pages_fetched,
                        events = stats.events_written,
                        checkpoints = stats.checkpoints_advanced,
                        cursor = report.last_checkpoint.as_ref().map(|c| c.as_str()),
                        duration_ms = stats.duration_ms,
                        "Sync completed"
                    ),
                    SyncOutcome::PageLimitReached => warn!(
                        feed = %report.feed,
                        pages = stats.pages_fetched,
                        events = stats.events_written,
                        cursor = report.last_checkpoint.as_ref().map(|c| c.as_str()),
                        duration_ms = stats.duration_ms,
                        "Sync page limit reached"
                    ),
                }
            }
            Err(failure) => {
                failed += 1;
                log_failure(&failure);
            }
        }
    }

    if failed > 0 {
        return Err(Error::RunFailed {
            failed,
            total: feeds.len(),
        });
    }
    Ok(())
}
