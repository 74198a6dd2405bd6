//! Error types for admission control.
//!
//! Separates the outcomes the enclosing request loop has to tell apart:
//! cancellation while waiting for a permit, an explicit overload signal from
//! the remote, and terminal failures once the retry budget is spent.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Boxed error raised by the wrapped operation
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for admission control operations
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Root error type for admission control
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The caller's cancellation signal fired while waiting for a permit
    #[error("Permit acquisition cancelled")]
    Cancelled,

    /// The remote explicitly signalled overload
    #[error("Throttled by remote service, retry after {retry_after:?}")]
    Throttled {
        /// Effective cooldown length
        retry_after: Duration,
        /// Instant at which the cooldown ends
        until: Instant,
        /// Overload status that triggered the cooldown, `None` for direct reports
        status: Option<u16>,
    },

    /// Retry budget spent on a retryable failure
    #[error("Retries exhausted after {attempts} attempts (last status: {last_status:?}): {source}")]
    RetriesExhausted {
        /// Number of calls issued
        attempts: u32,
        /// Status of the last response, `None` for transport failures
        last_status: Option<u16>,
        /// Error of the last attempt
        #[source]
        source: BoxError,
    },

    /// The call failed with a status that does not justify a retry
    #[error("Request rejected with status {status}: {source}")]
    Rejected {
        /// Response status
        status: u16,
        /// Underlying error
        #[source]
        source: BoxError,
    },
}

impl AdmissionError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ADMISSION_CONFIG",
            Self::Cancelled => "ADMISSION_CANCELLED",
            Self::Throttled { .. } => "ADMISSION_THROTTLED",
            Self::RetriesExhausted { .. } => "ADMISSION_RETRIES_EXHAUSTED",
            Self::Rejected { .. } => "ADMISSION_REJECTED",
        }
    }

    /// Check if a caller could sensibly try again later
    ///
    /// Only a throttling signal qualifies; cancellation and exhausted
    /// retries are terminal for the logical operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Get retry-after duration if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Get the cooldown end if this is a throttling error
    pub fn cooldown_until(&self) -> Option<Instant> {
        match self {
            Self::Throttled { until, .. } => Some(*until),
            _ => None,
        }
    }

    /// Get HTTP status code if applicable
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Throttled { status, .. } => *status,
            Self::RetriesExhausted { last_status, .. } => *last_status,
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Gate capacity must allow at least one permit
    #[error("Capacity must be at least 1")]
    ZeroCapacity,

    /// Refill interval must be non-zero
    #[error("Refill interval must be greater than zero")]
    ZeroRefillInterval,

    /// Backoff factor outside the accepted range
    #[error("Backoff factor must be finite and >= 1.0, got {0}")]
    InvalidBackoffFactor(String),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },
}
