//! Sink module
//!
//! Durable destination for fetched events. A page is split into batches that
//! respect the backend's limits (time span, record count, bytes) and each
//! batch is acknowledged before the next one is sent.
//!
//! # Destinations
//!
//! - `ObjectStoreSink` - one JSON-lines object per batch, deterministic keys
//! - `HttpLogSink` - newline-delimited JSON POSTed to an ingest endpoint
//! - `StdoutSink` - local debugging

mod batch;
mod destinations;
mod writer;

pub use batch::{split_into_batches, BatchLimits, LogBatch, LogRecord, EVENT_OVERHEAD_BYTES};
pub use destinations::{log_sink, HttpLogSink, ObjectStoreSink, StdoutSink};
pub use writer::{LogSink, SinkWriter};
