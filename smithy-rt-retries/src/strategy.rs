//! Retry strategy trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use smithy_rt_tracing::TraceSpan;
use std::fmt;
use std::future::Future;

use crate::error::RetryError;
use crate::outcome::Outcome;
use crate::policy::{RetryDirective, RetryPolicy};

/// Future returned by one attempt.
pub type AttemptFuture<'a, R, E> = BoxFuture<'a, Result<R, E>>;

/// Produces the future for attempt `n` (1-based).
pub type AttemptFn<'a, R, E> = Box<dyn FnMut(u32) -> AttemptFuture<'a, R, E> + Send + 'a>;

/// Runs an attempt block until a policy says stop.
///
/// Operation errors are returned unchanged in [`Outcome::Exception`]. When
/// the strategy has to end an execution without an operation error to
/// report (a rejected value, say), it converts a [`RetryError`] into `E`.
#[async_trait]
pub trait RetryStrategy<R, E>: Send + Sync + fmt::Debug {
    /// Run `block` under `policy`, posting diagnostics to `span`.
    async fn retry<'a>(
        &self,
        policy: &dyn RetryPolicy<R, E>,
        span: &TraceSpan,
        block: AttemptFn<'a, R, E>,
    ) -> Outcome<R, E>;

    /// Upper bound on attempts per execution.
    fn max_attempts(&self) -> u32;
}

/// Run `block` through `strategy` without boxing by hand.
pub async fn retry_with<'a, R, E, S, P, F, Fut>(
    strategy: &S,
    policy: &P,
    span: &TraceSpan,
    mut block: F,
) -> Outcome<R, E>
where
    S: RetryStrategy<R, E> + ?Sized,
    P: RetryPolicy<R, E>,
    F: FnMut(u32) -> Fut + Send + 'a,
    Fut: Future<Output = Result<R, E>> + Send + 'a,
{
    let block: AttemptFn<'a, R, E> = Box::new(move |attempt| block(attempt).boxed());
    strategy.retry(policy, span, block).await
}

/// Makes exactly one attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryStrategy;

#[async_trait]
impl<R, E> RetryStrategy<R, E> for NoRetryStrategy
where
    R: Send + 'static,
    E: From<RetryError> + Send + 'static,
{
    async fn retry<'a>(
        &self,
        policy: &dyn RetryPolicy<R, E>,
        span: &TraceSpan,
        mut block: AttemptFn<'a, R, E>,
    ) -> Outcome<R, E> {
        let result = block(1).await;
        let directive = policy.evaluate(&result);
        span.trace("NoRetryStrategy", move || format!("Single attempt finished: {directive:?}"));
        match (directive, result) {
            (RetryDirective::TerminateSuccess, result) => Outcome::from_result(1, result),
            (_, Err(error)) => Outcome::Exception { attempts: 1, error },
            (RetryDirective::TerminateFailure, Ok(_)) => Outcome::Exception {
                attempts: 1,
                error: RetryError::UnacceptableResult { attempts: 1 }.into(),
            },
            (RetryDirective::RetryError(_), Ok(_)) => Outcome::Exception {
                attempts: 1,
                error: RetryError::TooManyAttempts { attempts: 1 }.into(),
            },
        }
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}
