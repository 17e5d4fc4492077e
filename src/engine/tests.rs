//! Tests for engine module

use super::*;
use crate::checkpoint::MemoryCheckpointStore;
use crate::error::{Error, ErrorKind};
use crate::http::RetryPolicy;
use crate::sink::{BatchLimits, LogBatch, LogSink};
use crate::source::Event;
use crate::types::BackoffType;
use async_trait::async_trait;
use chrono::{Duration, TimeZone};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// Test doubles
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

fn events(prefix: &str, count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            serde_json::from_value(json!({
                "uuid": format!("{prefix}-{i}"),
                "timestamp": (now() - Duration::hours(1) + Duration::seconds(i as i64)).to_rfc3339(),
            }))
            .unwrap()
        })
        .collect()
}

fn page(events: Vec<Event>, cursor: &str, has_more: bool) -> Page {
    let cursor = (!cursor.is_empty()).then(|| Cursor::new(cursor));
    Page::new(events, cursor, has_more)
}

fn cursor(value: &str) -> Option<Cursor> {
    Some(Cursor::new(value))
}

type Responder = Box<dyn Fn(usize, &Seed) -> Result<Page> + Send + Sync>;

/// Answers fetches from a closure of (call index, seed)
struct ScriptedSource {
    respond: Responder,
    seeds: Mutex<Vec<Seed>>,
}

impl ScriptedSource {
    fn new(respond: impl Fn(usize, &Seed) -> Result<Page> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            seeds: Mutex::new(Vec::new()),
        })
    }

    /// Serves `pages` in order, then fails
    fn pages(pages: Vec<Page>) -> Arc<Self> {
        Self::new(move |call, _| {
            pages
                .get(call)
                .cloned()
                .ok_or_else(|| Error::http_status(404, "unexpected fetch"))
        })
    }

    fn seeds(&self) -> Vec<Seed> {
        self.seeds.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.seeds.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch_page(&self, seed: &Seed) -> Result<Page> {
        let call = {
            let mut seeds = self.seeds.lock().unwrap();
            seeds.push(seed.clone());
            seeds.len() - 1
        };
        (self.respond)(call, seed)
    }
}

/// Memory store with injectable failures and a log of every set
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCheckpointStore,
    fail_get: AtomicBool,
    fail_sets: AtomicUsize,
    sets: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn with_cursor(value: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCheckpointStore::with_cursor(value),
            ..Self::default()
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sets(&self) -> Vec<String> {
        self.sets.lock().unwrap().clone()
    }

    async fn current(&self) -> Option<Cursor> {
        self.inner.get_cursor().await.unwrap()
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::store("parameter store unavailable"));
        }
        self.inner.get_cursor().await
    }

    async fn set_cursor(&self, cursor: &Cursor) -> Result<()> {
        let remaining = self.fail_sets.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_sets.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::store("parameter store throttled"));
        }
        self.sets.lock().unwrap().push(cursor.to_string());
        self.inner.set_cursor(cursor).await
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

/// Records batches; fails the first `failures` submissions with a network
/// error and rejects every submission from `reject_from` on
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
    failures: usize,
    reject_from: Option<usize>,
}

impl RecordingSink {
    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }

    fn rejecting_from(call: usize) -> Arc<Self> {
        Arc::new(Self {
            reject_from: Some(call),
            ..Self::default()
        })
    }

    fn written_ids(&self) -> Vec<String> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    fn write_calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn put_batch(&self, batch: &LogBatch) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::network("connection reset by peer"));
        }
        if self.reject_from.is_some_and(|from| call >= from) {
            return Err(Error::write("batch rejected"));
        }
        self.batches
            .lock()
            .unwrap()
            .push(batch.records().iter().map(|r| r.id.clone()).collect());
        Ok(())
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_retries,
        BackoffType::Constant,
        std::time::Duration::from_millis(1),
        std::time::Duration::from_millis(1),
    )
}

fn engine(
    source: Arc<ScriptedSource>,
    store: Arc<FlakyStore>,
    sink: Arc<RecordingSink>,
) -> SyncEngine {
    SyncEngine::new(
        "signins",
        source,
        store,
        SinkWriter::new(sink, BatchLimits::default()),
    )
    .with_config(SyncConfig::new().with_retry(fast_retry(2)))
    .with_clock(now)
}

// ============================================================================
// SyncConfig Tests
// ============================================================================

#[test]
fn test_sync_config_default() {
    let config = SyncConfig::default();
    assert_eq!(config.max_pages, 100);
    assert_eq!(config.lookback, Duration::hours(24));
    assert_eq!(config.retry.max_retries, 3);
}

#[test]
fn test_sync_config_from_job() {
    let mut job = crate::config::SyncJobConfig::default();
    job.run.max_pages = 7;
    job.source.lookback_hours = 6;
    job.retry.max_retries = 1;

    let config = SyncConfig::from_job(&job);
    assert_eq!(config.max_pages, 7);
    assert_eq!(config.lookback, Duration::hours(6));
    assert_eq!(config.retry.max_retries, 1);
}

#[test]
fn test_run_state_display() {
    assert_eq!(RunState::SeedResolved.to_string(), "seed_resolved");
    assert_eq!(RunState::EmptyPage.to_string(), "empty_page");
    assert_eq!(RunState::Failed.to_string(), "failed");
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_first_run_writes_page_and_checkpoints() {
    let source = ScriptedSource::pages(vec![page(events("E", 3), "abc", false)]);
    let store = FlakyStore::empty();
    let sink = RecordingSink::ok();

    let report = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, SyncOutcome::Done);
    assert_eq!(report.seed, Seed::StartTime(now() - Duration::hours(24)));
    assert_eq!(source.seeds(), vec![report.seed.clone()]);
    assert_eq!(sink.write_calls(), 1);
    assert_eq!(sink.written_ids(), vec!["E-0", "E-1", "E-2"]);
    assert_eq!(store.sets(), vec!["abc"]);
    assert_eq!(report.last_checkpoint, cursor("abc"));
    assert_eq!(report.stats.events_written, 3);
    assert_eq!(report.stats.checkpoints_advanced, 1);
}

#[tokio::test]
async fn test_sentinel_checkpoint_is_first_run() {
    let source = ScriptedSource::pages(vec![page(vec![], "", false)]);
    let store = FlakyStore::with_cursor("first_run");

    let report = engine(source.clone(), store, RecordingSink::ok())
        .run()
        .await
        .unwrap();

    assert_eq!(report.seed, Seed::StartTime(now() - Duration::hours(24)));
}

#[tokio::test]
async fn test_empty_page_with_more_advances_and_continues() {
    let source = ScriptedSource::pages(vec![
        page(vec![], "c2", true),
        page(vec![], "", false),
    ]);
    let store = FlakyStore::with_cursor("c1");
    let sink = RecordingSink::ok();

    let report = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(sink.write_calls(), 0);
    assert_eq!(store.sets(), vec!["c2"]);
    assert_eq!(
        source.seeds(),
        vec![Seed::Cursor(Cursor::new("c1")), Seed::Cursor(Cursor::new("c2"))]
    );
    assert_eq!(report.outcome, SyncOutcome::Done);
    assert_eq!(report.stats.empty_pages, 2);
}

#[tokio::test]
async fn test_empty_final_page_does_not_move_checkpoint() {
    let source = ScriptedSource::pages(vec![page(vec![], "c9", false)]);
    let store = FlakyStore::with_cursor("c1");

    let report = engine(source, store.clone(), RecordingSink::ok())
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, SyncOutcome::Done);
    assert!(store.sets().is_empty());
    assert_eq!(store.current().await, cursor("c1"));
    assert_eq!(report.last_checkpoint, None);
}

#[tokio::test]
async fn test_follows_cursor_chain_across_pages() {
    let source = ScriptedSource::pages(vec![
        page(events("A", 2), "c2", true),
        page(events("B", 2), "c3", true),
        page(events("C", 1), "c4", false),
    ]);
    let store = FlakyStore::with_cursor("c1");
    let sink = RecordingSink::ok();

    let report = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        source.seeds(),
        vec![
            Seed::Cursor(Cursor::new("c1")),
            Seed::Cursor(Cursor::new("c2")),
            Seed::Cursor(Cursor::new("c3")),
        ]
    );
    assert_eq!(store.sets(), vec!["c2", "c3", "c4"]);
    assert_eq!(sink.written_ids(), vec!["A-0", "A-1", "B-0", "B-1", "C-0"]);
    assert_eq!(report.stats.pages_fetched, 3);
}

#[tokio::test]
async fn test_transient_write_failure_leaves_checkpoint() {
    let source = ScriptedSource::pages(vec![page(events("E", 500), "c2", true)]);
    let store = FlakyStore::with_cursor("c1");
    let sink = RecordingSink::failing(usize::MAX);

    let failure = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        Error::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(failure.error.kind(), ErrorKind::TransientNetwork);
    assert_eq!(failure.state, RunState::PageFetched);
    assert!(!failure.is_partial());
    assert!(store.sets().is_empty());
    assert_eq!(store.current().await, cursor("c1"));
    // No further pages after the failure
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_rejected_second_batch_keeps_checkpoint_and_replays_page() {
    // Two days apart: the page splits into two batches
    let spread: Vec<Event> = [("old", 49), ("new", 1)]
        .into_iter()
        .map(|(id, hours_ago)| {
            serde_json::from_value(json!({
                "uuid": id,
                "timestamp": (now() - Duration::hours(hours_ago)).to_rfc3339(),
            }))
            .unwrap()
        })
        .collect();
    let spread_page = page(spread, "c2", false);
    let source = ScriptedSource::pages(vec![spread_page.clone(), spread_page]);
    let store = FlakyStore::with_cursor("c1");
    let sink = RecordingSink::rejecting_from(1);

    let failure = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Write);
    assert_eq!(failure.state, RunState::PageFetched);
    assert!(!failure.is_partial());
    // First batch went out, second was refused once and not retried
    assert_eq!(sink.written_ids(), vec!["old"]);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    assert!(store.sets().is_empty());
    assert_eq!(store.current().await, cursor("c1"));

    // The next run starts from the same cursor and resends the whole page
    let retry_sink = RecordingSink::ok();
    let report = engine(source.clone(), store.clone(), retry_sink.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(
        source.seeds(),
        vec![Seed::Cursor(Cursor::new("c1")), Seed::Cursor(Cursor::new("c1"))]
    );
    assert_eq!(retry_sink.write_calls(), 2);
    assert_eq!(retry_sink.written_ids(), vec!["old", "new"]);
    assert_eq!(report.stats.batches_written, 2);
    assert_eq!(store.current().await, cursor("c2"));
}

#[tokio::test]
async fn test_checkpoint_failure_after_write_replays_page() {
    let page_one = page(events("E", 3), "c2", false);
    let source = ScriptedSource::pages(vec![page_one.clone(), page_one]);
    let store = FlakyStore::with_cursor("c1");
    store.fail_sets.store(1, Ordering::SeqCst);
    let sink = RecordingSink::ok();

    let failure = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Store);
    assert_eq!(failure.state, RunState::Written);
    assert_eq!(store.current().await, cursor("c1"));

    // Next invocation starts from the old checkpoint and rewrites the page
    let report = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(
        source.seeds(),
        vec![Seed::Cursor(Cursor::new("c1")), Seed::Cursor(Cursor::new("c1"))]
    );
    assert_eq!(
        sink.written_ids(),
        vec!["E-0", "E-1", "E-2", "E-0", "E-1", "E-2"]
    );
    assert_eq!(report.last_checkpoint, cursor("c2"));
    assert_eq!(store.current().await, cursor("c2"));
}

#[tokio::test]
async fn test_checkpoint_read_error_fails_closed() {
    let source = ScriptedSource::pages(vec![page(events("E", 1), "c2", false)]);
    let store = FlakyStore::empty();
    store.fail_get.store(true, Ordering::SeqCst);
    let sink = RecordingSink::ok();

    let failure = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Store);
    assert_eq!(failure.state, RunState::Start);
    assert_eq!(failure.seed, None);
    assert_eq!(source.calls(), 0);
    assert_eq!(sink.write_calls(), 0);
}

#[tokio::test]
async fn test_page_limit_stops_run() {
    let source = ScriptedSource::new(|call, _| {
        Ok(page(
            events(&format!("P{call}"), 1),
            &format!("c{}", call + 2),
            true,
        ))
    });
    let store = FlakyStore::with_cursor("c1");

    let report = engine(source.clone(), store.clone(), RecordingSink::ok())
        .with_config(SyncConfig::new().with_max_pages(3).with_retry(fast_retry(0)))
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, SyncOutcome::PageLimitReached);
    assert_eq!(source.calls(), 3);
    assert_eq!(store.sets(), vec!["c2", "c3", "c4"]);
    assert_eq!(report.last_checkpoint, cursor("c4"));
}

#[tokio::test]
async fn test_missing_cursor_is_decode_error_before_write() {
    let source = ScriptedSource::pages(vec![page(events("E", 2), "", false)]);
    let store = FlakyStore::with_cursor("c1");
    let sink = RecordingSink::ok();

    let failure = engine(source, store.clone(), sink.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Decode);
    assert_eq!(sink.write_calls(), 0);
    assert!(store.sets().is_empty());
}

#[tokio::test]
async fn test_empty_page_with_more_but_no_cursor_is_decode_error() {
    let source = ScriptedSource::pages(vec![page(vec![], "", true)]);
    let failure = engine(source, FlakyStore::with_cursor("c1"), RecordingSink::ok())
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Decode);
    assert_eq!(failure.state, RunState::EmptyPage);
}

#[tokio::test]
async fn test_transient_fetch_error_is_retried() {
    let source = ScriptedSource::new(|call, _| {
        if call == 0 {
            Err(Error::Server {
                status: 502,
                body: "bad gateway".to_string(),
            })
        } else {
            Ok(page(events("E", 1), "c2", false))
        }
    });
    let store = FlakyStore::with_cursor("c1");

    let report = engine(source.clone(), store.clone(), RecordingSink::ok())
        .run()
        .await
        .unwrap();

    assert_eq!(source.calls(), 2);
    assert_eq!(report.stats.pages_fetched, 1);
    assert_eq!(store.current().await, cursor("c2"));
}

#[tokio::test]
async fn test_fatal_fetch_error_is_not_retried() {
    let source = ScriptedSource::new(|_, _| Err(Error::auth("HTTP 401: invalid token")));
    let store = FlakyStore::with_cursor("c1");

    let failure = engine(source.clone(), store.clone(), RecordingSink::ok())
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Auth);
    assert_eq!(failure.state, RunState::SeedResolved);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_failure_after_progress_is_partial() {
    let source = ScriptedSource::new(|call, _| match call {
        0 => Ok(page(events("A", 2), "c2", true)),
        _ => Err(Error::Client {
            status: 400,
            body: "bad cursor".to_string(),
        }),
    });
    let store = FlakyStore::with_cursor("c1");

    let failure = engine(source.clone(), store.clone(), RecordingSink::ok())
        .run()
        .await
        .unwrap_err();

    assert!(failure.is_partial());
    assert_eq!(failure.last_checkpoint, cursor("c2"));
    assert_eq!(failure.state, RunState::SeedResolved);
    assert_eq!(store.current().await, cursor("c2"));
    assert!(failure.to_string().starts_with("feed signins failed in state seed_resolved"));
}

#[tokio::test]
async fn test_consecutive_runs_resume_from_checkpoint() {
    let source = ScriptedSource::new(|_, seed| match seed {
        Seed::StartTime(_) => Ok(page(events("A", 1), "c2", false)),
        Seed::Cursor(c) if c.as_str() == "c2" => Ok(page(events("B", 1), "c3", false)),
        Seed::Cursor(c) => Err(Error::http_status(404, format!("unexpected cursor {c}"))),
    });
    let store = FlakyStore::empty();
    let sink = RecordingSink::ok();

    engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();
    let second = engine(source.clone(), store.clone(), sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(second.seed, Seed::Cursor(Cursor::new("c2")));
    assert_eq!(store.sets(), vec!["c2", "c3"]);
    assert_eq!(sink.written_ids(), vec!["A-0", "B-0"]);
}
