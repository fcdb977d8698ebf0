//! Retry error types and error classification.

use thiserror::Error;

/// Category of a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryErrorType {
    /// A transient condition such as a timeout or dropped connection.
    Transient,
    /// The service asked the client to slow down.
    Throttling,
    /// The service failed to process a valid request.
    ServerError,
    /// The request failed for a client-side reason that may succeed later.
    ClientError,
}

/// Conditions raised by the retry machinery itself.
///
/// Operation errors are never wrapped in this type. A caller's error type
/// implements `From<RetryError>` so these conditions can be reported
/// through it when no operation error is available.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    /// The token bucket has no capacity for another attempt.
    #[error("insufficient retry capacity: {requested} units requested, {available} available")]
    CapacityExceeded {
        /// Units the attempt needed.
        requested: u32,
        /// Units left in the bucket.
        available: u32,
    },

    /// The attempt limit was reached while the policy still asked to retry.
    #[error("retry attempts exhausted after {attempts} attempts")]
    TooManyAttempts {
        /// Attempts made.
        attempts: u32,
    },

    /// The policy rejected a non-error result as a terminal failure.
    #[error("result rejected by retry policy after {attempts} attempts")]
    UnacceptableResult {
        /// Attempts made.
        attempts: u32,
    },

    /// The execution was cancelled by the caller.
    #[error("execution cancelled")]
    Cancelled,
}

impl RetryError {
    /// Create a capacity error.
    pub fn capacity_exceeded(requested: u32, available: u32) -> Self {
        Self::CapacityExceeded {
            requested,
            available,
        }
    }

    /// Whether this error came from the token bucket.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

/// Result type for retry operations.
pub type RetryResult<T> = Result<T, RetryError>;

/// Classification data exposed by operation errors.
///
/// Every method has a conservative default, so error types only override
/// what they know.
pub trait ErrorMetadata {
    /// Modeled error name, such as `"ThrottlingException"`.
    fn error_name(&self) -> Option<&str> {
        None
    }

    /// Transport status code, if the error came from a response.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Whether the error is modeled as retryable.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Whether the error is modeled as throttling.
    fn is_throttling(&self) -> bool {
        false
    }

    /// Whether the error is a transient condition such as a timeout.
    fn is_transient(&self) -> bool {
        false
    }
}

impl ErrorMetadata for RetryError {
    fn error_name(&self) -> Option<&str> {
        Some(match self {
            Self::CapacityExceeded { .. } => "RetryCapacityExceeded",
            Self::TooManyAttempts { .. } => "TooManyAttempts",
            Self::UnacceptableResult { .. } => "UnacceptableResult",
            Self::Cancelled => "Cancelled",
        })
    }
}
