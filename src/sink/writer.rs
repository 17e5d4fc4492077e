//! Sink writer
//!
//! Turns a page of events into backend-sized batches and submits them.

use super::batch::{split_into_batches, BatchLimits, LogBatch, LogRecord};
use crate::error::Result;
use crate::http::RetryPolicy;
use crate::source::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A log backend
///
/// `put_batch` returns `Ok` only once the backend confirmed the whole batch.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Submit one batch
    async fn put_batch(&self, batch: &LogBatch) -> Result<()>;
}

/// Splits pages into batches and submits them in order
#[derive(Clone)]
pub struct SinkWriter {
    sink: Arc<dyn LogSink>,
    limits: BatchLimits,
}

impl SinkWriter {
    /// Create a writer
    pub fn new(sink: Arc<dyn LogSink>, limits: BatchLimits) -> Self {
        Self { sink, limits }
    }

    /// Batch limits in effect
    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Backend name
    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Render and split events without submitting anything
    pub fn prepare(&self, events: &[Event]) -> Result<Vec<LogBatch>> {
        let records = events
            .iter()
            .map(LogRecord::from_event)
            .collect::<Result<Vec<_>>>()?;
        split_into_batches(records, &self.limits)
    }

    /// Submit prepared batches in order, stopping at the first failure
    pub async fn submit(&self, batches: &[LogBatch], retry: &RetryPolicy) -> Result<()> {
        for (index, batch) in batches.iter().enumerate() {
            debug!(
                sink = self.sink.name(),
                batch = index + 1,
                batches = batches.len(),
                records = batch.len(),
                bytes = batch.size_bytes(),
                "Submitting batch"
            );
            retry
                .run("sink write", || self.sink.put_batch(batch))
                .await?;
        }
        Ok(())
    }

    /// Write a page of events; returns the number of batches submitted
    ///
    /// `Ok` means every event is durably accepted. On error some leading
    /// batches may already be stored; they will be written again when the
    /// page is replayed.
    pub async fn write_batch(&self, events: &[Event], retry: &RetryPolicy) -> Result<usize> {
        let batches = self.prepare(events)?;
        self.submit(&batches, retry).await?;
        Ok(batches.len())
    }
}

impl std::fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkWriter")
            .field("sink", &self.sink.name())
            .field("limits", &self.limits)
            .finish()
    }
}
