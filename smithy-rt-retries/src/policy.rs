//! Retry policies.
//!
//! A policy looks at the result of one attempt and decides whether the
//! execution is finished or should be retried. Policies are pure: they do
//! not sleep, count attempts or touch the token bucket.

use std::collections::HashSet;

use crate::error::{ErrorMetadata, RetryErrorType};

/// Decision for one attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryDirective {
    /// The result is final and acceptable.
    TerminateSuccess,
    /// The result is a failure worth retrying.
    RetryError(RetryErrorType),
    /// The result is a final failure.
    TerminateFailure,
}

impl RetryDirective {
    /// Whether the directive asks for another attempt.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RetryError(_))
    }
}

/// Decides whether an attempt result should be retried.
pub trait RetryPolicy<R, E>: Send + Sync {
    /// Classify one attempt result.
    fn evaluate(&self, result: &Result<R, E>) -> RetryDirective;
}

impl<R, E, F> RetryPolicy<R, E> for F
where
    F: Fn(&Result<R, E>) -> RetryDirective + Send + Sync,
{
    fn evaluate(&self, result: &Result<R, E>) -> RetryDirective {
        self(result)
    }
}

/// Never retries. Values succeed and errors fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl<R, E> RetryPolicy<R, E> for NoRetryPolicy {
    fn evaluate(&self, result: &Result<R, E>) -> RetryDirective {
        match result {
            Ok(_) => RetryDirective::TerminateSuccess,
            Err(_) => RetryDirective::TerminateFailure,
        }
    }
}

const THROTTLING_ERRORS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
];

const TRANSIENT_ERRORS: &[&str] = &["RequestTimeout", "RequestTimeoutException"];

const TRANSIENT_STATUS_CODES: &[u16] = &[500, 502, 503, 504];

/// Default classification for errors exposing [`ErrorMetadata`].
///
/// Throttling and transient conditions are recognised by flag, by modeled
/// error name or (for throttling) by status 429. Server errors are the
/// 500/502/503/504 statuses. Errors modeled as retryable are retried as
/// server or client errors depending on their status. Everything else is
/// final.
#[derive(Debug, Clone)]
pub struct StandardRetryPolicy {
    throttling_errors: HashSet<String>,
    transient_errors: HashSet<String>,
}

impl Default for StandardRetryPolicy {
    fn default() -> Self {
        Self {
            throttling_errors: THROTTLING_ERRORS.iter().map(|s| (*s).to_string()).collect(),
            transient_errors: TRANSIENT_ERRORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl StandardRetryPolicy {
    /// Create a policy with the default error names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat errors named `name` as throttling.
    #[must_use]
    pub fn with_throttling_error(mut self, name: impl Into<String>) -> Self {
        self.throttling_errors.insert(name.into());
        self
    }

    /// Treat errors named `name` as transient.
    #[must_use]
    pub fn with_transient_error(mut self, name: impl Into<String>) -> Self {
        self.transient_errors.insert(name.into());
        self
    }

    /// Classify an error, or `None` if it should not be retried.
    pub fn classify<E: ErrorMetadata + ?Sized>(&self, error: &E) -> Option<RetryErrorType> {
        let name = error.error_name();
        let status = error.status_code();

        if error.is_throttling()
            || status == Some(429)
            || name.is_some_and(|n| self.throttling_errors.contains(n))
        {
            return Some(RetryErrorType::Throttling);
        }
        if error.is_transient() || name.is_some_and(|n| self.transient_errors.contains(n)) {
            return Some(RetryErrorType::Transient);
        }
        if status.is_some_and(|s| TRANSIENT_STATUS_CODES.contains(&s)) {
            return Some(RetryErrorType::ServerError);
        }
        if error.is_retryable() {
            return Some(match status {
                Some(s) if s >= 500 => RetryErrorType::ServerError,
                _ => RetryErrorType::ClientError,
            });
        }
        None
    }
}

impl<R, E> RetryPolicy<R, E> for StandardRetryPolicy
where
    E: ErrorMetadata,
{
    fn evaluate(&self, result: &Result<R, E>) -> RetryDirective {
        match result {
            Ok(_) => RetryDirective::TerminateSuccess,
            Err(e) => self
                .classify(e)
                .map_or(RetryDirective::TerminateFailure, RetryDirective::RetryError),
        }
    }
}
