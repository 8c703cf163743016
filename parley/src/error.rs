//! Unified error types for parley.
//!
//! The hierarchy mirrors the request pipeline:
//!
//! - [`ServiceError`] is the raw failure reported by a completion service,
//!   optionally carrying the upstream HTTP response.
//! - [`CompletionError`] is that failure after classification
//!   (see [`classify`](crate::classify)), tagged with a [`CompletionErrorKind`].
//! - [`StoreError`], [`PublishError`], [`OutputError`] and [`ConfigError`] cover
//!   the collaborators around the completion call.
//!
//! All of them fold into [`Error`], whose [`kind`](Error::kind) lets callers
//! branch without matching on every variant.

use std::fmt;

use serde_json::Value;

/// Result type alias for parley operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type returned by the orchestrator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Classified completion-service failure.
    #[error("completion: {0}")]
    Completion(#[from] CompletionError),

    /// Conversation store failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// The model output could not be shaped as requested.
    #[error("output: {0}")]
    Output(#[from] OutputError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// The request cannot be served as specified.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse error categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The completion service answered 429.
    RateLimited,
    /// The completion service rejected the request.
    Upstream,
    /// The completion service could not be reached.
    Transport,
    /// A cached history entry or the model output was malformed.
    Deserialization,
    /// The cache backend failed.
    Cache,
    /// The request was rejected before any I/O.
    InvalidRequest,
    /// Configuration was missing or invalid.
    Config,
}

impl Error {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Completion(e) => match e.kind {
                CompletionErrorKind::RateLimited => ErrorKind::RateLimited,
                CompletionErrorKind::Upstream => ErrorKind::Upstream,
                CompletionErrorKind::Transport => ErrorKind::Transport,
            },
            Self::Store(StoreError::Backend { .. }) => ErrorKind::Cache,
            Self::Store(_) | Self::Output(_) => ErrorKind::Deserialization,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Returns `true` only for rate-limit failures, the one kind intended for
    /// caller-side retry with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited)
    }
}

// ============================================================================
// Raw Service Errors
// ============================================================================

/// Upstream HTTP response attached to a [`ServiceError`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response payload; parsed JSON when possible, otherwise a string.
    pub body: Value,
}

/// Failure reported by a completion service before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    /// Human-readable description.
    pub message: String,
    /// Upstream response, absent for transport or client-side failures.
    pub response: Option<UpstreamResponse>,
}

impl ServiceError {
    /// A failure that never produced an upstream response.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// A failure carrying an upstream response.
    #[must_use]
    pub fn upstream(status: u16, body: Value) -> Self {
        let detail = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map_or_else(|| body.to_string(), ToString::to_string);
        Self {
            message: format!("{status} {detail}"),
            response: Some(UpstreamResponse { status, body }),
        }
    }

    /// Status code of the upstream response, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::upstream(status.as_u16(), Value::String(err.to_string()))
        } else if err.is_timeout() {
            Self::transport("Request timed out")
        } else if err.is_connect() {
            Self::transport(format!("Connection failed: {err}"))
        } else {
            Self::transport(err.to_string())
        }
    }
}

// ============================================================================
// Classified Completion Errors
// ============================================================================

/// Categories of classified completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionErrorKind {
    /// Upstream answered with HTTP 429.
    RateLimited,
    /// Upstream answered with any other error response.
    Upstream,
    /// No upstream response was received.
    Transport,
}

impl CompletionErrorKind {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "RateLimitExceeded",
            Self::Upstream => "Upstream",
            Self::Transport => "Transport",
        }
    }
}

/// A completion-service failure tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct CompletionError {
    /// The error kind.
    pub kind: CompletionErrorKind,
    /// The original failure message.
    pub message: String,
    /// Upstream status code, if a response was received.
    pub status: Option<u16>,
    /// Upstream payload, if a response was received.
    pub body: Option<Value>,
}

impl CompletionError {
    /// Build a classified error from a raw service failure.
    #[must_use]
    pub fn new(kind: CompletionErrorKind, source: ServiceError) -> Self {
        let (status, body) = source
            .response
            .map_or((None, None), |r| (Some(r.status), Some(r.body)));
        Self {
            kind,
            message: source.message,
            status,
            body,
        }
    }

    /// Whether this is a rate-limit failure.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.kind, CompletionErrorKind::RateLimited)
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for CompletionError {}

// ============================================================================
// Store Errors
// ============================================================================

/// Error type for conversation store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A stored history element is not a valid message.
    #[error("malformed history entry at index {index}: {source}")]
    Deserialization {
        /// Position of the element in the stored list.
        index: usize,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A message could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache backend encountered an error.
    #[error("[{backend}] {message}")]
    Backend {
        /// Backend identifier (e.g., `"redis"`).
        backend: &'static str,
        /// Human-readable error description.
        message: String,
    },
}

impl StoreError {
    /// Creates a [`Backend`](Self::Backend) error for the given backend.
    #[must_use]
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::backend("redis", e.to_string())
    }
}

// ============================================================================
// Publish Errors
// ============================================================================

/// Error type for topic publishing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PublishError {
    /// The topic backend encountered an error.
    #[error("[{backend}] {message}")]
    Backend {
        /// Backend identifier.
        backend: &'static str,
        /// Human-readable error description.
        message: String,
    },
}

impl PublishError {
    /// Creates a [`Backend`](Self::Backend) error for the given backend.
    #[must_use]
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PublishError {
    fn from(e: redis::RedisError) -> Self {
        Self::backend("redis", e.to_string())
    }
}

// ============================================================================
// Output Errors
// ============================================================================

/// Error type for output shaping.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OutputError {
    /// Output text or call arguments are not valid JSON.
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),

    /// A schema was requested but the model answered with free text.
    #[error("expected a structured call but the model answered with text")]
    MissingFunctionCall,
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing required value.
    #[error("missing: {0}")]
    Missing(String),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a missing value error.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
