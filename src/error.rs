//! Error types for event-sync
//!
//! Every component returns `Result<T, Error>`. The variants follow the
//! failure taxonomy the orchestrator uses to decide between retrying the
//! current page and aborting the run.

use thiserror::Error;

/// Maximum number of payload bytes kept on a decode error for diagnosis
pub const MAX_PAYLOAD_EXCERPT: usize = 2048;

/// The main error type for event-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ============================================================================
    // Transport Errors (source and sink)
    // ============================================================================
    #[error("Network error: {message}")]
    TransientNetwork { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Server error HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Client error HTTP {status}: {body}")]
    Client { status: u16, body: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String, payload: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // ============================================================================
    // Checkpoint Errors
    // ============================================================================
    #[error("Checkpoint store error: {message}")]
    Store { message: String },

    // ============================================================================
    // Sink Errors
    // ============================================================================
    #[error("Sink write failed: {message}")]
    Write { message: String },

    #[error("Sink accepted {accepted} of {submitted} records")]
    PartialWrite { accepted: usize, submitted: usize },

    // ============================================================================
    // Run Errors
    // ============================================================================
    #[error("{failed} of {total} feed(s) failed")]
    RunFailed { failed: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Token retrieval or rejected credentials
    Auth,
    /// Connection failure, timeout or rate limiting
    TransientNetwork,
    /// 5xx-class response
    Server,
    /// 4xx-class response other than auth and rate limiting
    Client,
    /// Response body did not match the expected shape
    Decode,
    /// Checkpoint get/set failure
    Store,
    /// Sink rejected or partially accepted a batch
    Write,
    /// Invalid configuration
    Config,
    /// Anything else
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::TransientNetwork => "transient_network",
            Self::Server => "server",
            Self::Client => "client",
            Self::Decode => "decode",
            Self::Store => "store",
            Self::Write => "write",
            Self::Config => "config",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a transient network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    /// Create a decode error, keeping a bounded excerpt of the raw payload
    pub fn decode(message: impl Into<String>, payload: &str) -> Self {
        Self::Decode {
            message: message.into(),
            payload: excerpt(payload),
        }
    }

    /// Create a checkpoint store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a sink write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Classify an HTTP status that is not a success
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Auth {
                message: format!("HTTP {status}: {body}"),
            },
            429 => Self::RateLimited {
                retry_after_seconds: 0,
            },
            500..=599 => Self::Server { status, body },
            _ => Self::Client { status, body },
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth { .. } => ErrorKind::Auth,
            Error::TransientNetwork { .. } | Error::Timeout { .. } | Error::RateLimited { .. } => {
                ErrorKind::TransientNetwork
            }
            Error::Server { .. } => ErrorKind::Server,
            Error::Client { .. } => ErrorKind::Client,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::RetriesExhausted { source, .. } => source.kind(),
            Error::Store { .. } => ErrorKind::Store,
            Error::Write { .. } | Error::PartialWrite { .. } => ErrorKind::Write,
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_) => ErrorKind::Config,
            _ => ErrorKind::Other,
        }
    }

    /// Raw payload captured by a decode error, looking through retries
    pub fn payload(&self) -> Option<&str> {
        match self {
            Error::Decode { payload, .. } if !payload.is_empty() => Some(payload),
            Error::RetriesExhausted { source, .. } => source.payload(),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork { .. }
                | Error::Timeout { .. }
                | Error::RateLimited { .. }
                | Error::Server { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Timeout { timeout_ms: 0 };
        }
        if let Some(status) = e.status() {
            return Error::http_status(status.as_u16(), e.to_string());
        }
        if e.is_decode() {
            return Error::decode(format!("invalid response body: {e}"), "");
        }
        if e.is_builder() {
            return Error::config(format!("invalid request: {e}"));
        }
        Error::network(e.to_string())
    }
}

/// Truncate a payload on a char boundary for inclusion in errors and logs
pub fn excerpt(payload: &str) -> String {
    if payload.len() <= MAX_PAYLOAD_EXCERPT {
        return payload.to_string();
    }
    let mut end = MAX_PAYLOAD_EXCERPT;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &payload[..end])
}

/// Result type alias for event-sync
pub type Result<T> = std::result::Result<T, Error>;
