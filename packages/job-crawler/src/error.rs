//! Typed errors for the job crawler.
//!
//! Uses `thiserror` for library errors; the binary wraps them in `anyhow`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a source adapter can report while fetching or reading a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, 5xx, throttling). Retryable.
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The page or a record on it could not be read. Skipped, never retried.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// The source refuses service for the rest of this run (blocked, gone).
    #[error("source unavailable: {reason}")]
    Fatal { reason: String },

    /// Anything the adapter could not classify.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into().into())
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// The report-level classification of this error.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::Parse { .. } => FetchErrorKind::Parse,
            FetchError::Fatal { .. } => FetchErrorKind::Fatal,
            FetchError::Unknown(_) => FetchErrorKind::Unknown,
        }
    }
}

/// Serializable error classification carried in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    Parse,
    Fatal,
    Unknown,
    ChallengeTimeout,
    Cancelled,
}

impl FetchErrorKind {
    /// Whether another attempt at the same unit of work may succeed.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::Network | FetchErrorKind::ChallengeTimeout
        )
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Parse => "parse",
            FetchErrorKind::Fatal => "fatal",
            FetchErrorKind::Unknown => "unknown",
            FetchErrorKind::ChallengeTimeout => "challenge_timeout",
            FetchErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid crawl configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("keyword set must not be empty")]
    EmptyKeywords,

    #[error("source list must not be empty")]
    EmptySources,

    #[error("unknown job source: {0}")]
    UnknownSource(String),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// A board layout that does not compile.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid CSS selector {0:?}")]
    Selector(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors writing results to an output sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encode error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for adapter fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;
