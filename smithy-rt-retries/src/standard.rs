//! The standard retry strategy.
//!
//! Each attempt runs under a token from the shared [`TokenBucket`]. Failed
//! attempts the policy classifies as retryable are retried after an
//! exponential, fully jittered delay until the attempt limit is reached or
//! the bucket runs dry:
//!
//! 1. Acquire a token for attempt `n`. If none is available, stop with the
//!    error that caused the retry.
//! 2. Run the attempt and evaluate its result with the policy.
//! 3. On `TerminateSuccess` release the token as a success and stop.
//! 4. On `TerminateFailure` release it as non-retryable and stop.
//! 5. On `RetryError` release it as a retryable failure. Stop if `n` is the
//!    last attempt, otherwise sleep for the backoff delay and go to 1 with
//!    `n + 1`.
//!
//! Dropping the returned future at any suspension point stops the
//! execution; a held token is released as a failure by its drop guard.

use async_trait::async_trait;
use smithy_rt_core::{Clock, CoreError, DslProperty, SystemClock};
use smithy_rt_tracing::TraceSpan;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::backoff::{DelayProvider, ExponentialBackoffBuilder, ExponentialBackoffWithJitter};
use crate::bucket::{
    StandardRetryTokenBucket, StandardRetryTokenBucketBuilder, TokenBucket, TokenOutcome,
};
use crate::config::StandardRetryStrategyConfig;
use crate::error::RetryError;
use crate::outcome::Outcome;
use crate::policy::{RetryDirective, RetryPolicy};
use crate::strategy::{AttemptFn, RetryStrategy};

const COMPONENT: &str = "StandardRetryStrategy";

/// Token-bucket gated retries with exponential backoff.
#[derive(Clone)]
pub struct StandardRetryStrategy {
    max_attempts: u32,
    token_bucket: Arc<dyn TokenBucket>,
    delay_provider: Arc<dyn DelayProvider>,
    clock: Arc<dyn Clock>,
}

impl StandardRetryStrategy {
    /// Create a strategy from `config` using the system clock.
    #[must_use]
    pub fn new(config: StandardRetryStrategyConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a strategy from `config` driven by `clock`.
    #[must_use]
    pub fn with_clock(config: StandardRetryStrategyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            token_bucket: Arc::new(StandardRetryTokenBucket::with_clock(
                config.token_bucket,
                clock.clone(),
            )),
            delay_provider: Arc::new(ExponentialBackoffWithJitter::new(config.backoff)),
            clock,
        }
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> StandardRetryStrategyBuilder {
        StandardRetryStrategyBuilder::default()
    }

    /// The shared token bucket.
    #[must_use]
    pub fn token_bucket(&self) -> &Arc<dyn TokenBucket> {
        &self.token_bucket
    }

    /// The delay provider.
    #[must_use]
    pub fn delay_provider(&self) -> &Arc<dyn DelayProvider> {
        &self.delay_provider
    }
}

impl Default for StandardRetryStrategy {
    fn default() -> Self {
        Self::new(StandardRetryStrategyConfig::default())
    }
}

impl fmt::Debug for StandardRetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRetryStrategy")
            .field("max_attempts", &self.max_attempts)
            .field("token_bucket", &self.token_bucket)
            .field("delay_provider", &self.delay_provider)
            .finish()
    }
}

#[async_trait]
impl<R, E> RetryStrategy<R, E> for StandardRetryStrategy
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
        let max_attempts = self.max_attempts;
        let mut attempt = 1;
        let mut token = match self.token_bucket.acquire(attempt, None).await {
            Ok(token) => token,
            Err(e) => {
                let message = e.to_string();
                span.warn_with(COMPONENT, Arc::new(e.clone()), move || {
                    format!("No capacity for first attempt: {message}")
                });
                return Outcome::Exception {
                    attempts: 0,
                    error: e.into(),
                };
            }
        };

        loop {
            span.trace(COMPONENT, move || format!("Starting attempt {attempt} of {max_attempts}"));
            let result = block(attempt).await;

            match policy.evaluate(&result) {
                RetryDirective::TerminateSuccess => {
                    token.release(TokenOutcome::Success);
                    span.debug(COMPONENT, move || format!("Attempt {attempt} accepted"));
                    return Outcome::from_result(attempt, result);
                }
                RetryDirective::TerminateFailure => {
                    token.release(TokenOutcome::NonRetryableFailure);
                    span.debug(COMPONENT, move || format!("Attempt {attempt} failed terminally"));
                    let error = match result {
                        Err(e) => e,
                        Ok(_) => RetryError::UnacceptableResult { attempts: attempt }.into(),
                    };
                    return Outcome::Exception {
                        attempts: attempt,
                        error,
                    };
                }
                RetryDirective::RetryError(cause) => {
                    token.release(TokenOutcome::RetryableFailure);

                    if attempt >= max_attempts {
                        span.debug(COMPONENT, move || {
                            format!("Attempt {attempt} failed with {cause:?}; no attempts left")
                        });
                        let error = match result {
                            Err(e) => e,
                            Ok(_) => RetryError::TooManyAttempts { attempts: attempt }.into(),
                        };
                        return Outcome::Exception {
                            attempts: attempt,
                            error,
                        };
                    }

                    let delay = self.delay_provider.backoff(attempt);
                    debug!(
                        attempt,
                        ?cause,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    span.debug(COMPONENT, move || {
                        format!("Attempt {attempt} failed with {cause:?}; retrying in {delay:?}")
                    });
                    self.clock.sleep(delay).await;

                    token = match self.token_bucket.acquire(attempt + 1, Some(cause)).await {
                        Ok(token) => token,
                        Err(e) => {
                            let message = e.to_string();
                            span.warn_with(COMPONENT, Arc::new(e.clone()), move || {
                                format!(
                                    "Retry capacity exhausted after attempt {attempt}: {message}"
                                )
                            });
                            let error = match result {
                                Err(original) => original,
                                Ok(_) => e.into(),
                            };
                            return Outcome::Exception {
                                attempts: attempt,
                                error,
                            };
                        }
                    };
                    attempt += 1;
                }
            }
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

type TokenBucketProperty = DslProperty<Arc<dyn TokenBucket>, StandardRetryTokenBucketBuilder>;
type DelayProperty = DslProperty<Arc<dyn DelayProvider>, ExponentialBackoffBuilder>;

/// Builder for [`StandardRetryStrategy`].
///
/// The token bucket and delay provider can each be given as a finished
/// instance or configured in place. Configuring a component after an
/// instance was supplied is an error.
#[derive(Debug)]
pub struct StandardRetryStrategyBuilder {
    max_attempts: u32,
    token_bucket: TokenBucketProperty,
    delay_provider: DelayProperty,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for StandardRetryStrategyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: StandardRetryStrategyConfig::default().max_attempts,
            token_bucket: DslProperty::default(),
            delay_provider: DslProperty::default(),
            clock: None,
        }
    }
}

impl StandardRetryStrategyBuilder {
    /// Set max attempts. Values below one are treated as one.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Use an existing token bucket, typically one shared across clients.
    #[must_use]
    pub fn token_bucket(mut self, bucket: Arc<dyn TokenBucket>) -> Self {
        self.token_bucket.set_instance(bucket);
        self
    }

    /// Configure the standard token bucket.
    pub fn configure_token_bucket<F>(mut self, f: F) -> Result<Self, CoreError>
    where
        F: FnOnce(&mut StandardRetryTokenBucketBuilder),
    {
        self.token_bucket.configure("token_bucket", f)?;
        Ok(self)
    }

    /// Use an existing delay provider.
    #[must_use]
    pub fn delay_provider(mut self, provider: Arc<dyn DelayProvider>) -> Self {
        self.delay_provider.set_instance(provider);
        self
    }

    /// Configure the exponential backoff.
    pub fn configure_backoff<F>(mut self, f: F) -> Result<Self, CoreError>
    where
        F: FnOnce(&mut ExponentialBackoffBuilder),
    {
        self.delay_provider.configure("delay_provider", f)?;
        Ok(self)
    }

    /// Drive backoff sleeps and bucket refill from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the strategy.
    #[must_use]
    pub fn build(mut self) -> StandardRetryStrategy {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        if let Some(bucket) = self.token_bucket.configured_mut() {
            bucket.default_clock(clock.clone());
        }
        let bucket_clock = clock.clone();
        StandardRetryStrategy {
            max_attempts: self.max_attempts,
            token_bucket: self.token_bucket.build(|| {
                Arc::new(StandardRetryTokenBucket::builder().clock(bucket_clock).build())
            }),
            delay_provider: self
                .delay_provider
                .build(|| Arc::new(ExponentialBackoffWithJitter::default())),
            clock,
        }
    }
}
