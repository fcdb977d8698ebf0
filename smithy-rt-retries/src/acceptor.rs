//! Rule-based retry policies.
//!
//! An [`AcceptorRetryPolicy`] holds an ordered list of [`Acceptor`]s. The
//! first acceptor whose matcher fits the attempt result decides; when none
//! match, a fallback policy decides.

use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorMetadata, RetryErrorType};
use crate::policy::{RetryDirective, RetryPolicy, StandardRetryPolicy};

/// What a matching acceptor does to the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceptorState {
    /// Finish successfully.
    Success,
    /// Finish with a failure.
    Failure,
    /// Retry.
    Retry,
}

impl From<AcceptorState> for RetryDirective {
    fn from(state: AcceptorState) -> Self {
        match state {
            AcceptorState::Success => RetryDirective::TerminateSuccess,
            AcceptorState::Failure => RetryDirective::TerminateFailure,
            AcceptorState::Retry => RetryDirective::RetryError(RetryErrorType::ServerError),
        }
    }
}

/// Predicate over an operation output.
pub type OutputPredicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Condition an acceptor tests.
pub enum Matcher<R> {
    /// `Success(true)` matches any value, `Success(false)` any error.
    Success(bool),
    /// Matches errors with this modeled name.
    ErrorName(String),
    /// Matches errors carrying this status code.
    Status(u16),
    /// Matches values satisfying the predicate.
    Output(OutputPredicate<R>),
}

impl<R> Matcher<R> {
    /// Match on an output predicate.
    pub fn output<F>(predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self::Output(Arc::new(predicate))
    }

    fn matches<E: ErrorMetadata>(&self, result: &Result<R, E>) -> bool {
        match (self, result) {
            (Self::Success(expect_ok), r) => r.is_ok() == *expect_ok,
            (Self::ErrorName(name), Err(e)) => e.error_name() == Some(name.as_str()),
            (Self::Status(code), Err(e)) => e.status_code() == Some(*code),
            (Self::Output(predicate), Ok(value)) => predicate(value),
            _ => false,
        }
    }
}

impl<R> Clone for Matcher<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Success(b) => Self::Success(*b),
            Self::ErrorName(n) => Self::ErrorName(n.clone()),
            Self::Status(s) => Self::Status(*s),
            Self::Output(p) => Self::Output(Arc::clone(p)),
        }
    }
}

impl<R> fmt::Debug for Matcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(b) => f.debug_tuple("Success").field(b).finish(),
            Self::ErrorName(n) => f.debug_tuple("ErrorName").field(n).finish(),
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::Output(_) => f.write_str("Output(..)"),
        }
    }
}

/// A matcher paired with the state it leads to.
pub struct Acceptor<R> {
    /// State on match.
    pub state: AcceptorState,
    /// Condition to test.
    pub matcher: Matcher<R>,
}

impl<R> Acceptor<R> {
    /// Create a new acceptor.
    pub fn new(state: AcceptorState, matcher: Matcher<R>) -> Self {
        Self { state, matcher }
    }
}

impl<R> Clone for Acceptor<R> {
    fn clone(&self) -> Self {
        Self::new(self.state, self.matcher.clone())
    }
}

impl<R> fmt::Debug for Acceptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("state", &self.state)
            .field("matcher", &self.matcher)
            .finish()
    }
}

/// Policy driven by an ordered list of acceptors.
pub struct AcceptorRetryPolicy<R, E> {
    acceptors: Vec<Acceptor<R>>,
    fallback: Box<dyn RetryPolicy<R, E>>,
}

impl<R, E> AcceptorRetryPolicy<R, E>
where
    R: 'static,
    E: ErrorMetadata + 'static,
{
    /// Create a policy that falls back to [`StandardRetryPolicy`].
    pub fn new(acceptors: Vec<Acceptor<R>>) -> Self {
        Self {
            acceptors,
            fallback: Box::new(StandardRetryPolicy::new()),
        }
    }

    /// Replace the fallback policy.
    #[must_use]
    pub fn with_fallback<P>(mut self, fallback: P) -> Self
    where
        P: RetryPolicy<R, E> + 'static,
    {
        self.fallback = Box::new(fallback);
        self
    }

    /// Append an acceptor.
    #[must_use]
    pub fn with_acceptor(mut self, acceptor: Acceptor<R>) -> Self {
        self.acceptors.push(acceptor);
        self
    }

    /// The acceptors, in evaluation order.
    pub fn acceptors(&self) -> &[Acceptor<R>] {
        &self.acceptors
    }
}

impl<R, E> RetryPolicy<R, E> for AcceptorRetryPolicy<R, E>
where
    E: ErrorMetadata,
{
    fn evaluate(&self, result: &Result<R, E>) -> RetryDirective {
        self.acceptors
            .iter()
            .find(|a| a.matcher.matches(result))
            .map_or_else(|| self.fallback.evaluate(result), |a| a.state.into())
    }
}

impl<R, E> fmt::Debug for AcceptorRetryPolicy<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptorRetryPolicy")
            .field("acceptors", &self.acceptors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NoRetryPolicy;

    #[derive(Debug)]
    struct ApiError {
        name: &'static str,
        status: u16,
    }

    impl ErrorMetadata for ApiError {
        fn error_name(&self) -> Option<&str> {
            Some(self.name)
        }
        fn status_code(&self) -> Option<u16> {
            Some(self.status)
        }
    }

    fn err(name: &'static str, status: u16) -> Result<String, ApiError> {
        Err(ApiError { name, status })
    }

    fn waiter_policy() -> AcceptorRetryPolicy<String, ApiError> {
        AcceptorRetryPolicy::new(vec![
            Acceptor::new(AcceptorState::Success, Matcher::output(|s: &String| s == "ACTIVE")),
            Acceptor::new(AcceptorState::Failure, Matcher::output(|s: &String| s == "FAILED")),
            Acceptor::new(AcceptorState::Retry, Matcher::Success(true)),
            Acceptor::new(AcceptorState::Retry, Matcher::ErrorName("ResourceNotFound".into())),
        ])
    }

    #[test]
    fn test_first_match_wins() {
        let policy = waiter_policy();
        assert_eq!(policy.evaluate(&Ok("ACTIVE".into())), RetryDirective::TerminateSuccess);
        assert_eq!(policy.evaluate(&Ok("FAILED".into())), RetryDirective::TerminateFailure);
        assert!(policy.evaluate(&Ok("CREATING".into())).is_retry());
        assert!(policy.evaluate(&err("ResourceNotFound", 404)).is_retry());
    }

    #[test]
    fn test_unmatched_uses_fallback() {
        let policy = waiter_policy();
        assert_eq!(
            policy.evaluate(&err("ServiceUnavailable", 503)),
            RetryDirective::RetryError(RetryErrorType::ServerError)
        );
        assert_eq!(policy.evaluate(&err("AccessDenied", 403)), RetryDirective::TerminateFailure);

        let strict = waiter_policy().with_fallback(NoRetryPolicy);
        assert_eq!(
            strict.evaluate(&err("ServiceUnavailable", 503)),
            RetryDirective::TerminateFailure
        );
    }

    #[test]
    fn test_status_matcher() {
        let policy = AcceptorRetryPolicy::<String, ApiError>::new(Vec::new())
            .with_acceptor(Acceptor::new(AcceptorState::Success, Matcher::Status(404)));
        assert_eq!(policy.evaluate(&err("NotFound", 404)), RetryDirective::TerminateSuccess);
        assert_eq!(policy.acceptors().len(), 1);
    }
}
