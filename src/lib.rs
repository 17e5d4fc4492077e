// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # event-sync
//!
//! Incremental synchronization of a paginated event API into a log sink.
//!
//! Every invocation resumes from a persisted cursor, fetches pages until the
//! source reports no more data, and advances the cursor only after the sink
//! acknowledged the page. Delivery is at-least-once: an interrupted run
//! replays at most the page it was working on.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │          SyncEngine          │
//!            │  fetch → write → checkpoint  │
//!            └──────┬──────────┬─────────┬──┘
//!                   │          │         │
//!        ┌──────────┴──┐ ┌─────┴─────┐ ┌─┴───────────────┐
//!        │ SourceClient│ │ SinkWriter│ │ CheckpointStore │
//!        ├─────────────┤ ├───────────┤ ├─────────────────┤
//!        │ Events API  │ │ Object st.│ │ File            │
//!        │ Bearer auth │ │ HTTP      │ │ Object store    │
//!        │ Rate limit  │ │ Stdout    │ │                 │
//!        └─────────────┘ └───────────┘ └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use event_sync::cli::run_job;
//! use event_sync::config::SyncJobConfig;
//!
//! #[tokio::main]
//! async fn main() -> event_sync::Result<()> {
//!     let config = SyncJobConfig::load("event-sync.yaml")?;
//!     run_job(&config, None).await
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Job configuration
pub mod config;

/// Bearer token providers
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Object storage locations
pub mod storage;

/// Events API client and data model
pub mod source;

/// Checkpoint stores
pub mod checkpoint;

/// Log sinks and batch splitting
pub mod sink;

/// Sync state machine
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorKind, Result};
pub use types::*;

// Re-export commonly used types
pub use checkpoint::CheckpointStore;
pub use config::SyncJobConfig;
pub use engine::{SyncEngine, SyncFailure, SyncOutcome, SyncReport};
pub use sink::{LogSink, SinkWriter};
pub use source::{Cursor, Event, Page, Seed, SourceClient};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
