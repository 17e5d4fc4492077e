//! Source module
//!
//! Fetches pages of events from the remote API, seeded either by a
//! continuation cursor or by a start time on first run.
//!
//! # Wire contract
//!
//! - Request: `POST {endpoint}` with `{"limit": n, "start_time": RFC3339}` or `{"cursor": c}`
//! - Response: `{"cursor": string, "has_more": bool, "items": [Event...]}`
//! - Auth: `Authorization: Bearer <token>`

mod client;
mod types;

pub use client::{EventsApiClient, SourceClient};
pub use types::{Cursor, Event, Page, Seed, FIRST_RUN_SENTINEL};

#[cfg(test)]
mod tests;
