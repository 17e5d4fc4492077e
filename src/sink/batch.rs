//! Log records and batch splitting

use crate::error::{Error, Result};
use crate::source::Event;
use crate::types::JsonValue;
use serde_json::json;

/// Bytes a log backend charges per record on top of the message
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// One event rendered for the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Event identifier
    pub id: String,
    /// Event time in milliseconds since the epoch
    pub timestamp_ms: i64,
    /// Event serialized as JSON
    pub message: String,
}

impl LogRecord {
    /// Render an event
    pub fn from_event(event: &Event) -> Result<Self> {
        Ok(Self {
            id: event.uuid().to_string(),
            timestamp_ms: event.timestamp().timestamp_millis(),
            message: serde_json::to_string(event.payload())?,
        })
    }

    /// Size counted against `BatchLimits::max_bytes`
    pub fn size_bytes(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD_BYTES
    }

    /// Line shape shared by the line-oriented sinks
    pub fn envelope(&self, group: &str, stream: &str) -> JsonValue {
        json!({
            "timestamp": self.timestamp_ms,
            "log_group": group,
            "log_stream": stream,
            "message": self.message,
        })
    }
}

/// Per-batch limits imposed by the log backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum distance between the earliest and latest record
    pub max_span: chrono::Duration,
    /// Maximum records per batch
    pub max_events: usize,
    /// Maximum bytes per batch, overhead included
    pub max_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_span: chrono::Duration::hours(24),
            max_events: 10_000,
            max_bytes: 1_048_576,
        }
    }
}

/// Records submitted together in one sink call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
    records: Vec<LogRecord>,
    bytes: usize,
    min_ms: i64,
    max_ms: i64,
}

impl LogBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in submission order
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total size including per-record overhead
    pub fn size_bytes(&self) -> usize {
        self.bytes
    }

    /// First record
    pub fn first(&self) -> Option<&LogRecord> {
        self.records.first()
    }

    /// Last record
    pub fn last(&self) -> Option<&LogRecord> {
        self.records.last()
    }

    /// Distance between the earliest and latest record
    pub fn span(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_ms - self.min_ms)
    }

    fn fits(&self, record: &LogRecord, limits: &BatchLimits) -> bool {
        if self.records.is_empty() {
            return true;
        }
        let min = self.min_ms.min(record.timestamp_ms);
        let max = self.max_ms.max(record.timestamp_ms);
        self.records.len() < limits.max_events
            && self.bytes + record.size_bytes() <= limits.max_bytes
            && chrono::Duration::milliseconds(max - min) <= limits.max_span
    }

    fn push(&mut self, record: LogRecord) {
        if self.records.is_empty() {
            self.min_ms = record.timestamp_ms;
            self.max_ms = record.timestamp_ms;
        } else {
            self.min_ms = self.min_ms.min(record.timestamp_ms);
            self.max_ms = self.max_ms.max(record.timestamp_ms);
        }
        self.bytes += record.size_bytes();
        self.records.push(record);
    }
}

impl FromIterator<LogRecord> for LogBatch {
    fn from_iter<I: IntoIterator<Item = LogRecord>>(iter: I) -> Self {
        let mut batch = Self::new();
        for record in iter {
            batch.push(record);
        }
        batch
    }
}

/// Split records into contiguous batches that each satisfy `limits`
///
/// Record order is preserved within and across batches, so concatenating the
/// result yields the input. A record that alone exceeds `max_bytes` can never
/// be written and fails the whole split.
pub fn split_into_batches(records: Vec<LogRecord>, limits: &BatchLimits) -> Result<Vec<LogBatch>> {
    let mut batches = Vec::new();
    let mut current = LogBatch::new();

    for record in records {
        if record.size_bytes() > limits.max_bytes {
            return Err(Error::write(format!(
                "event {} is {} bytes, above the {} byte batch limit",
                record.id,
                record.size_bytes(),
                limits.max_bytes
            )));
        }
        if !current.fits(&record, limits) {
            batches.push(std::mem::take(&mut current));
        }
        current.push(record);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}
