//! Error types for the relay.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for all relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Run still active after {0} polls")]
    PollLimit(u32),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<RelayError>,
    },

    #[error("Session cancelled")]
    Cancelled,
}

impl RelayError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a caller-facing category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::PollLimit(_) => ErrorCategory::Connection,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Configuration(_) | Self::ConfigFile(_) => ErrorCategory::Configuration,
            Self::Protocol(_) | Self::Serialization(_) => ErrorCategory::Parse,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                408 | 429 | 500..=599 => ErrorCategory::Connection,
                _ => ErrorCategory::Execution,
            },
            Self::RetriesExhausted { last_error, .. } => last_error.category(),
            Self::Io(_) | Self::Cancelled => ErrorCategory::Unknown,
        }
    }

    /// Whether this is a transient transport failure worth retrying.
    ///
    /// Protocol errors are never retried: a malformed handshake does not
    /// correct itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RelayError>;
