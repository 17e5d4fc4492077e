//! Source data model
//!
//! Events, cursors, seeds and pages as exchanged with the events API.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Stored value meaning "synchronization has never run"
pub const FIRST_RUN_SENTINEL: &str = "first_run";

// ============================================================================
// Event
// ============================================================================

/// One observed occurrence reported by the source API
///
/// Only `uuid` and `timestamp` are interpreted. The object is otherwise kept
/// exactly as received, nulls and unknown keys included, and is what the sink
/// writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonObject", into = "JsonObject")]
pub struct Event {
    uuid: String,
    timestamp: DateTime<Utc>,
    payload: JsonObject,
}

impl Event {
    /// Unique event identifier; empty when the source omitted it
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// When the event happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The event object as received
    pub fn payload(&self) -> &JsonObject {
        &self.payload
    }
}

impl TryFrom<JsonObject> for Event {
    type Error = String;

    fn try_from(payload: JsonObject) -> std::result::Result<Self, Self::Error> {
        let uuid = match payload.get("uuid") {
            Some(JsonValue::String(uuid)) => uuid.clone(),
            None | Some(JsonValue::Null) => String::new(),
            Some(other) => return Err(format!("event uuid is not a string: {other}")),
        };
        let timestamp = match payload.get("timestamp") {
            Some(JsonValue::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| format!("event {uuid} has invalid timestamp {raw:?}: {e}"))?
                .with_timezone(&Utc),
            _ => return Err(format!("event {uuid} has no timestamp")),
        };
        Ok(Self {
            uuid,
            timestamp,
            payload,
        })
    }
}

impl From<Event> for JsonObject {
    fn from(event: Event) -> Self {
        event.payload
    }
}

// ============================================================================
// Cursor and Seed
// ============================================================================

/// Opaque continuation token issued by the source API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a cursor value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this value stands for "no cursor yet"
    pub fn is_sentinel(&self) -> bool {
        let value = self.0.trim();
        value.is_empty() || value == FIRST_RUN_SENTINEL
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a fetch starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Continue from a cursor
    Cursor(Cursor),
    /// Start a fresh query at this time
    StartTime(DateTime<Utc>),
}

impl Seed {
    /// Resolve the seed from the stored checkpoint
    ///
    /// A missing or sentinel value yields a time window of `now - lookback`;
    /// any other value is used verbatim as the cursor.
    pub fn resolve(stored: Option<Cursor>, now: DateTime<Utc>, lookback: chrono::Duration) -> Self {
        match stored {
            Some(cursor) if !cursor.is_sentinel() => Self::Cursor(cursor),
            _ => Self::StartTime(now - lookback),
        }
    }

    /// Request body for this seed; carries either a cursor or a start time
    pub fn request_body(&self, limit: u32) -> JsonValue {
        match self {
            Self::Cursor(cursor) => json!({ "cursor": cursor.as_str() }),
            Self::StartTime(start) => json!({
                "limit": limit,
                "start_time": start.to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
        }
    }
}

impl std::fmt::Display for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cursor(cursor) => write!(f, "cursor {cursor}"),
            Self::StartTime(start) => write!(
                f,
                "start_time {}",
                start.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        }
    }
}

// ============================================================================
// Page
// ============================================================================

/// Wire shape of a page response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PageResponse {
    #[serde(default)]
    pub cursor: String,
    pub has_more: bool,
    #[serde(default)]
    pub items: Vec<Event>,
}

/// The result of one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Events in source order
    pub events: Vec<Event>,
    /// Cursor to resume after this page, if the source supplied one
    pub next_cursor: Option<Cursor>,
    /// Whether more pages exist beyond this one
    pub has_more: bool,
}

impl Page {
    /// Create a page
    pub fn new(events: Vec<Event>, next_cursor: Option<Cursor>, has_more: bool) -> Self {
        Self {
            events,
            next_cursor,
            has_more,
        }
    }

    /// Whether the page carries no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// The cursor to checkpoint, required once the page must be recorded
    pub fn require_cursor(&self) -> Result<&Cursor> {
        self.next_cursor.as_ref().ok_or_else(|| {
            Error::decode(
                format!(
                    "page with {} events and has_more={} carries no cursor",
                    self.events.len(),
                    self.has_more
                ),
                "",
            )
        })
    }
}

impl From<PageResponse> for Page {
    fn from(response: PageResponse) -> Self {
        let next_cursor = Some(Cursor::new(response.cursor)).filter(|c| !c.as_str().is_empty());
        Self {
            events: response.items,
            next_cursor,
            has_more: response.has_more,
        }
    }
}
