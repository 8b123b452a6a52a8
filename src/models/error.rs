//! Error types for prospector.
//!
//! Taxonomy:
//! - Expected failures: bad input, missing columns, parse errors
//! - Infrastructure failures: network, timeout, rate limits, storage
//! - Invariant violations: internal bugs

use thiserror::Error;

/// Top-level error type for prospector.
#[derive(Debug, Error)]
pub enum ProspectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Finder service error: {0}")]
    FinderApi(#[from] FinderApiError),

    #[error("Storage error: {context}: {message}")]
    Storage { context: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Finder service specific errors (remote backend and verifier).
#[derive(Debug, Error)]
pub enum FinderApiError {
    #[error("Authentication failed: invalid or missing API key")]
    AuthenticationFailed,

    #[error("Rate limited by finder service: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<f64>,
    },

    #[error("Finder service error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ProspectorError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Network(_)
                | Self::FinderApi(FinderApiError::RateLimited { .. })
        )
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::FinderApi(FinderApiError::RateLimited {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for prospector.
pub type Result<T> = std::result::Result<T, ProspectorError>;
