//! Sink destinations

use super::batch::{LogBatch, LogRecord};
use super::writer::LogSink;
use crate::auth::EnvTokenProvider;
use crate::config::{SinkConfig, SinkDestination};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::storage::ObjectLocation;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Build the sink for one stream
pub fn log_sink(config: &SinkConfig, stream: &str) -> Result<Arc<dyn LogSink>> {
    Ok(match &config.destination {
        SinkDestination::ObjectStore { url } => Arc::new(ObjectStoreSink::new(
            ObjectLocation::parse(url)?,
            &config.group,
            stream,
        )),
        SinkDestination::Http { url, token_env } => Arc::new(HttpLogSink::new(
            url,
            &config.group,
            stream,
            token_env.as_deref(),
        )?),
        SinkDestination::Stdout => Arc::new(StdoutSink::new(&config.group, stream)),
    })
}

fn ndjson<F>(batch: &LogBatch, mut line: F) -> Result<String>
where
    F: FnMut(&LogRecord) -> Result<String>,
{
    let mut body = String::with_capacity(batch.size_bytes());
    for record in batch.records() {
        body.push_str(&line(record)?);
        body.push('\n');
    }
    Ok(body)
}

// ============================================================================
// Object store
// ============================================================================

/// Writes each batch as a JSON-lines object
///
/// Keys derive from the batch content only, so replaying a page overwrites
/// the objects written the first time.
#[derive(Debug, Clone)]
pub struct ObjectStoreSink {
    location: ObjectLocation,
    group: String,
    stream: String,
}

impl ObjectStoreSink {
    /// Create a sink writing under `location`
    pub fn new(location: ObjectLocation, group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            location,
            group: group.into(),
            stream: stream.into(),
        }
    }

    /// Object key for a batch, relative to the location prefix
    pub fn object_key(&self, batch: &LogBatch) -> Result<String> {
        let (first, last) = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::write("cannot name an empty batch")),
        };
        let day = Utc
            .timestamp_millis_opt(first.timestamp_ms)
            .single()
            .ok_or_else(|| Error::write(format!("timestamp out of range: {}", first.timestamp_ms)))?
            .format("%Y-%m-%d");

        Ok(format!(
            "{}/{}/dt={day}/{}-{}-{}.jsonl",
            self.group, self.stream, first.timestamp_ms, last.timestamp_ms, first.id
        ))
    }
}

#[async_trait]
impl LogSink for ObjectStoreSink {
    fn name(&self) -> &str {
        "object_store"
    }

    async fn put_batch(&self, batch: &LogBatch) -> Result<()> {
        let key = self.object_key(batch)?;
        let body = ndjson(batch, |record| Ok(record.message.clone()))?;

        self.location
            .put(&key, Bytes::from(body))
            .await
            .map_err(|e| match e {
                object_store::Error::NotImplemented
                | object_store::Error::PermissionDenied { .. }
                | object_store::Error::Unauthenticated { .. } => {
                    Error::write(format!("Failed to write {}: {e}", self.location.display(&key)))
                }
                other => Error::network(format!(
                    "Failed to write {}: {other}",
                    self.location.display(&key)
                )),
            })?;

        debug!(key = %self.location.display(&key), records = batch.len(), "Batch stored");
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    rejected_count: usize,
}

/// POSTs each batch as newline-delimited JSON
#[derive(Debug)]
pub struct HttpLogSink {
    http: HttpClient,
    url: String,
    group: String,
    stream: String,
}

impl HttpLogSink {
    /// Create a sink; `token_env` names an env var holding a bearer token
    pub fn new(
        url: impl Into<String>,
        group: impl Into<String>,
        stream: impl Into<String>,
        token_env: Option<&str>,
    ) -> Result<Self> {
        let config = HttpClientConfig::builder().build();
        let http = match token_env {
            Some(var) => HttpClient::with_auth(config, Arc::new(EnvTokenProvider::new(var)))?,
            None => HttpClient::with_config(config)?,
        };
        Ok(Self {
            http,
            url: url.into(),
            group: group.into(),
            stream: stream.into(),
        })
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn put_batch(&self, batch: &LogBatch) -> Result<()> {
        let body = ndjson(batch, |record| {
            Ok(serde_json::to_string(
                &record.envelope(&self.group, &self.stream),
            )?)
        })?;

        let response = self
            .http
            .send(
                Method::POST,
                &self.url,
                RequestConfig::new().text("application/x-ndjson", body),
            )
            .await?;

        // An empty or non-JSON 2xx body counts as full acceptance
        let text = response.text().await.map_err(Error::from)?;
        let reply: IngestResponse = serde_json::from_str(&text).unwrap_or_default();
        if reply.rejected_count > 0 {
            return Err(Error::PartialWrite {
                accepted: batch.len().saturating_sub(reply.rejected_count),
                submitted: batch.len(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Stdout
// ============================================================================

/// Prints each record as one JSON line
#[derive(Debug, Clone)]
pub struct StdoutSink {
    group: String,
    stream: String,
}

impl StdoutSink {
    /// Create a stdout sink
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl LogSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn put_batch(&self, batch: &LogBatch) -> Result<()> {
        let body = ndjson(batch, |record| {
            Ok(serde_json::to_string(
                &record.envelope(&self.group, &self.stream),
            )?)
        })?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(body.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}
