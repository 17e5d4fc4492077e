//! HTTP client module
//!
//! Provides the HTTP client shared by the source client and the HTTP sink,
//! plus the retry policy the orchestrator applies around network calls.
//!
//! # Features
//!
//! - **Error Classification**: Transport and status failures map onto the crate taxonomy
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Retry Policy**: Constant, linear and exponential backoff
//! - **Authentication**: Bearer tokens from a [`TokenProvider`](crate::auth::TokenProvider)

mod client;
mod rate_limit;
mod retry;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestBody, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use retry::RetryPolicy;
