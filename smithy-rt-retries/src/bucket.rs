//! Retry token buckets.
//!
//! A token bucket is the client-wide circuit breaker for retries. Every
//! attempt takes a [`RetryToken`] from the bucket and hands it back when the
//! attempt finishes. Successful attempts return their cost plus a bonus;
//! failed ones return nothing, so a run of failures drains the bucket and
//! stops further retries across all executions sharing it.
//!
//! Bucket state is only locked for bookkeeping, never while an attempt or a
//! wait is in flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use smithy_rt_core::{BuildInto, Clock, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::config::TokenBucketConfig;
use crate::error::{RetryError, RetryErrorType, RetryResult};

/// How an attempt holding a token ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenOutcome {
    /// The attempt succeeded.
    Success,
    /// The attempt failed and the failure was retryable.
    RetryableFailure,
    /// The attempt failed terminally.
    NonRetryableFailure,
}

/// Receives released tokens on behalf of a bucket.
pub trait TokenRelease: Send + Sync {
    /// Account for a token of `cost` units released with `outcome`.
    fn release(&self, cost: u32, outcome: TokenOutcome);
}

/// Permission to perform one attempt.
///
/// A token is released exactly once: [`RetryToken::release`] consumes it.
/// A token dropped without being released (for example because the
/// execution was cancelled) is released as a retryable failure.
#[must_use = "a retry token must be released with the attempt outcome"]
pub struct RetryToken {
    attempt: u32,
    cost: u32,
    ledger: Option<Arc<dyn TokenRelease>>,
}

impl RetryToken {
    /// Create a token that reports back to `ledger` when released.
    pub fn new(attempt: u32, cost: u32, ledger: Option<Arc<dyn TokenRelease>>) -> Self {
        Self {
            attempt,
            cost,
            ledger,
        }
    }

    /// The attempt this token was issued for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Units this token holds.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Return the token to its bucket.
    pub fn release(mut self, outcome: TokenOutcome) {
        if let Some(ledger) = self.ledger.take() {
            ledger.release(self.cost, outcome);
        }
    }
}

impl Drop for RetryToken {
    fn drop(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            debug!(
                attempt = self.attempt,
                cost = self.cost,
                "Retry token dropped without release, returning it as a failure"
            );
            ledger.release(self.cost, TokenOutcome::RetryableFailure);
        }
    }
}

impl fmt::Debug for RetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryToken")
            .field("attempt", &self.attempt)
            .field("cost", &self.cost)
            .field("released", &self.ledger.is_none())
            .finish()
    }
}

/// A capacity-limited source of retry tokens.
#[async_trait]
pub trait TokenBucket: Send + Sync + fmt::Debug {
    /// Acquire a token for `attempt` (1-based).
    ///
    /// `cause` is the failure type that triggered a retry, or `None` for the
    /// first attempt.
    async fn acquire(&self, attempt: u32, cause: Option<RetryErrorType>) -> RetryResult<RetryToken>;

    /// Units currently available.
    fn available(&self) -> u32;

    /// Maximum units the bucket holds.
    fn capacity(&self) -> u32;
}

/// A bucket that always grants capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfiniteTokenBucket;

#[async_trait]
impl TokenBucket for InfiniteTokenBucket {
    async fn acquire(
        &self,
        attempt: u32,
        _cause: Option<RetryErrorType>,
    ) -> RetryResult<RetryToken> {
        Ok(RetryToken::new(attempt, 0, None))
    }

    fn available(&self) -> u32 {
        u32::MAX
    }

    fn capacity(&self) -> u32 {
        u32::MAX
    }
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: DateTime<Utc>,
}

struct Shared {
    config: TokenBucketConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
    released: Notify,
}

impl Shared {
    fn refill(&self, state: &mut BucketState, now: DateTime<Utc>) {
        if self.config.refill_units_per_second == 0 {
            state.last_refill = now;
            return;
        }
        let elapsed = (now - state.last_refill).num_microseconds().unwrap_or(i64::MAX);
        if elapsed <= 0 {
            return;
        }
        let units = elapsed as f64 / 1_000_000.0 * f64::from(self.config.refill_units_per_second);
        state.available = (state.available + units).min(f64::from(self.config.capacity));
        state.last_refill = now;
    }

    fn cost_for(&self, attempt: u32, cause: Option<RetryErrorType>) -> u32 {
        match (attempt, cause) {
            (1, _) | (_, None) => self.config.initial_try_cost,
            (_, Some(RetryErrorType::Transient)) => self.config.timeout_retry_cost,
            (_, Some(_)) => self.config.retry_cost,
        }
    }
}

impl TokenRelease for Shared {
    fn release(&self, cost: u32, outcome: TokenOutcome) {
        if outcome != TokenOutcome::Success {
            trace!(cost, ?outcome, "Retry token released without refund");
            return;
        }
        {
            let mut state = self.state.lock();
            let refund = f64::from(cost) + f64::from(self.config.success_increment);
            state.available = (state.available + refund).min(f64::from(self.config.capacity));
        }
        self.released.notify_waiters();
    }
}

/// The standard bucket: per-attempt costs, success refunds and time refill.
#[derive(Clone)]
pub struct StandardRetryTokenBucket {
    shared: Arc<Shared>,
}

impl StandardRetryTokenBucket {
    /// Create a full bucket using the system clock.
    #[must_use]
    pub fn new(config: TokenBucketConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a full bucket driven by `clock`.
    #[must_use]
    pub fn with_clock(config: TokenBucketConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let available = f64::from(config.capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                state: Mutex::new(BucketState {
                    available,
                    last_refill: now,
                }),
                released: Notify::new(),
            }),
        }
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> StandardRetryTokenBucketBuilder {
        StandardRetryTokenBucketBuilder::default()
    }

    /// The bucket settings.
    #[must_use]
    pub fn config(&self) -> &TokenBucketConfig {
        &self.shared.config
    }

    fn try_take(&self, cost: u32) -> Result<(), (u32, Duration)> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        shared.refill(&mut state, shared.clock.now());

        let needed = f64::from(cost);
        if state.available >= needed {
            state.available -= needed;
            return Ok(());
        }

        let deficit = needed - state.available;
        let wait = match shared.config.refill_units_per_second {
            0 => Duration::MAX,
            rate => Duration::from_secs_f64(deficit / f64::from(rate)),
        };
        Err((state.available.floor() as u32, wait))
    }
}

#[async_trait]
impl TokenBucket for StandardRetryTokenBucket {
    async fn acquire(
        &self,
        attempt: u32,
        cause: Option<RetryErrorType>,
    ) -> RetryResult<RetryToken> {
        let cost = self.shared.cost_for(attempt, cause);
        if cost > self.shared.config.capacity {
            return Err(RetryError::capacity_exceeded(cost, self.available()));
        }

        loop {
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let (available, wait) = match self.try_take(cost) {
                Ok(()) => {
                    let ledger: Arc<dyn TokenRelease> = self.shared.clone();
                    return Ok(RetryToken::new(attempt, cost, Some(ledger)));
                }
                Err(shortfall) => shortfall,
            };

            if self.shared.config.circuit_breaker_mode {
                debug!(attempt, cost, available, "Retry capacity exhausted");
                return Err(RetryError::capacity_exceeded(cost, available));
            }

            trace!(
                attempt,
                cost,
                available,
                wait_ms = wait.as_millis() as u64,
                "Waiting for retry capacity"
            );
            if wait == Duration::MAX {
                released.await;
            } else {
                tokio::select! {
                    _ = &mut released => {}
                    _ = self.shared.clock.sleep(wait) => {}
                }
            }
        }
    }

    fn available(&self) -> u32 {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        shared.refill(&mut state, shared.clock.now());
        state.available.floor() as u32
    }

    fn capacity(&self) -> u32 {
        self.shared.config.capacity
    }
}

impl fmt::Debug for StandardRetryTokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRetryTokenBucket")
            .field("config", &self.shared.config)
            .field("available", &self.shared.state.lock().available)
            .finish()
    }
}

/// Builder for [`StandardRetryTokenBucket`].
#[derive(Debug, Default)]
pub struct StandardRetryTokenBucketBuilder {
    config: TokenBucketConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl StandardRetryTokenBucketBuilder {
    /// Start from an existing config.
    #[must_use]
    pub fn from_config(config: TokenBucketConfig) -> Self {
        Self {
            config,
            clock: None,
        }
    }

    /// Set capacity.
    #[must_use]
    pub fn capacity(mut self, units: u32) -> Self {
        self.set_capacity(units);
        self
    }

    /// Set capacity in place.
    pub fn set_capacity(&mut self, units: u32) {
        self.config.capacity = units;
    }

    /// Set the first-attempt cost.
    #[must_use]
    pub fn initial_try_cost(mut self, units: u32) -> Self {
        self.config.initial_try_cost = units;
        self
    }

    /// Set the retry cost.
    #[must_use]
    pub fn retry_cost(mut self, units: u32) -> Self {
        self.set_retry_cost(units);
        self
    }

    /// Set the retry cost in place.
    pub fn set_retry_cost(&mut self, units: u32) {
        self.config.retry_cost = units;
    }

    /// Set the retry cost after transient failures.
    #[must_use]
    pub fn timeout_retry_cost(mut self, units: u32) -> Self {
        self.config.timeout_retry_cost = units;
        self
    }

    /// Set the success bonus.
    #[must_use]
    pub fn success_increment(mut self, units: u32) -> Self {
        self.config.success_increment = units;
        self
    }

    /// Set the refill rate.
    #[must_use]
    pub fn refill_units_per_second(mut self, units: u32) -> Self {
        self.set_refill_units_per_second(units);
        self
    }

    /// Set the refill rate in place.
    pub fn set_refill_units_per_second(&mut self, units: u32) {
        self.config.refill_units_per_second = units;
    }

    /// Fail fast (`true`) or wait for capacity (`false`).
    #[must_use]
    pub fn circuit_breaker_mode(mut self, enabled: bool) -> Self {
        self.set_circuit_breaker_mode(enabled);
        self
    }

    /// Set circuit breaker mode in place.
    pub fn set_circuit_breaker_mode(&mut self, enabled: bool) {
        self.config.circuit_breaker_mode = enabled;
    }

    /// Use `clock` for refill timing.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use `clock` unless a clock was already set.
    pub fn default_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock.get_or_insert(clock);
    }

    /// Build the bucket.
    #[must_use]
    pub fn build(self) -> StandardRetryTokenBucket {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        StandardRetryTokenBucket::with_clock(self.config, clock)
    }
}

impl BuildInto<Arc<dyn TokenBucket>> for StandardRetryTokenBucketBuilder {
    fn build_into(self) -> Arc<dyn TokenBucket> {
        Arc::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smithy_rt_core::ManualClock;

    fn bucket(config: TokenBucketConfig) -> (StandardRetryTokenBucket, ManualClock) {
        let clock = ManualClock::starting_now();
        let bucket = StandardRetryTokenBucket::with_clock(config, Arc::new(clock.clone()));
        (bucket, clock)
    }

    fn small_config() -> TokenBucketConfig {
        TokenBucketConfig {
            capacity: 10,
            initial_try_cost: 1,
            retry_cost: 5,
            timeout_retry_cost: 8,
            success_increment: 1,
            refill_units_per_second: 0,
            circuit_breaker_mode: true,
        }
    }

    #[tokio::test]
    async fn test_costs_by_attempt_and_cause() {
        let (bucket, _) = bucket(small_config());

        let first = bucket.acquire(1, None).await.unwrap();
        assert_eq!(first.cost(), 1);
        let retry = bucket.acquire(2, Some(RetryErrorType::ServerError)).await.unwrap();
        assert_eq!(retry.cost(), 5);
        assert_eq!(bucket.available(), 4);

        first.release(TokenOutcome::NonRetryableFailure);
        retry.release(TokenOutcome::RetryableFailure);
        assert_eq!(bucket.available(), 4);

        let transient = bucket.acquire(3, Some(RetryErrorType::Transient)).await;
        assert!(matches!(
            transient,
            Err(RetryError::CapacityExceeded { requested: 8, available: 4 })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_beyond_capacity_fails() {
        let config = TokenBucketConfig {
            capacity: 3,
            ..small_config()
        };
        let (bucket, _) = bucket(config);

        let results = futures::future::join_all((0..5).map(|_| bucket.acquire(1, None))).await;
        let (granted, denied): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);

        assert_eq!(granted.len(), 3);
        assert_eq!(denied.len(), 2);
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test]
    async fn test_success_refund_capped_at_capacity() {
        let config = TokenBucketConfig {
            initial_try_cost: 0,
            success_increment: 3,
            ..small_config()
        };
        let (bucket, _) = bucket(config);

        bucket.acquire(1, None).await.unwrap().release(TokenOutcome::Success);
        assert_eq!(bucket.available(), 10);

        let token = bucket.acquire(2, Some(RetryErrorType::Throttling)).await.unwrap();
        assert_eq!(bucket.available(), 5);
        token.release(TokenOutcome::Success);
        assert_eq!(bucket.available(), 10);
    }

    #[tokio::test]
    async fn test_dropped_token_counts_as_failure() {
        let (bucket, _) = bucket(small_config());
        {
            let _token = bucket.acquire(2, Some(RetryErrorType::ServerError)).await.unwrap();
        }
        assert_eq!(bucket.available(), 5);
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        let config = TokenBucketConfig {
            refill_units_per_second: 2,
            ..small_config()
        };
        let (bucket, clock) = bucket(config);

        bucket.acquire(2, None).await.unwrap().release(TokenOutcome::RetryableFailure);
        bucket
            .acquire(2, Some(RetryErrorType::ServerError))
            .await
            .unwrap()
            .release(TokenOutcome::RetryableFailure);
        assert_eq!(bucket.available(), 4);

        clock.advance(Duration::from_secs(2));
        assert_eq!(bucket.available(), 8);

        clock.advance(Duration::from_secs(60));
        assert_eq!(bucket.available(), 10);
    }

    #[tokio::test]
    async fn test_blocking_mode_waits_for_refill() {
        let config = TokenBucketConfig {
            capacity: 5,
            refill_units_per_second: 1,
            circuit_breaker_mode: false,
            ..small_config()
        };
        let (bucket, clock) = bucket(config);

        bucket
            .acquire(2, Some(RetryErrorType::ServerError))
            .await
            .unwrap()
            .release(TokenOutcome::RetryableFailure);
        assert_eq!(bucket.available(), 0);

        let token = bucket.acquire(2, Some(RetryErrorType::ServerError)).await.unwrap();
        assert_eq!(token.cost(), 5);
        let waited: Duration = clock.sleeps().iter().sum();
        assert!(waited >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_blocking_mode_wakes_on_release() {
        let config = TokenBucketConfig {
            capacity: 5,
            circuit_breaker_mode: false,
            ..small_config()
        };
        let (bucket, _) = bucket(config);
        let holder = bucket.acquire(2, Some(RetryErrorType::ServerError)).await.unwrap();

        let waiter = {
            let bucket = bucket.clone();
            tokio::spawn(async move { bucket.acquire(2, Some(RetryErrorType::ServerError)).await })
        };
        tokio::task::yield_now().await;
        holder.release(TokenOutcome::Success);

        let token = waiter.await.unwrap().unwrap();
        assert_eq!(token.cost(), 5);
    }

    #[tokio::test]
    async fn test_cost_above_capacity_fails_even_when_blocking() {
        let config = TokenBucketConfig {
            capacity: 4,
            circuit_breaker_mode: false,
            ..small_config()
        };
        let (bucket, _) = bucket(config);
        assert!(bucket.acquire(2, Some(RetryErrorType::ServerError)).await.is_err());
    }

    #[tokio::test]
    async fn test_infinite_bucket() {
        let bucket = InfiniteTokenBucket;
        for attempt in 1..=100 {
            bucket
                .acquire(attempt, Some(RetryErrorType::Throttling))
                .await
                .unwrap()
                .release(TokenOutcome::RetryableFailure);
        }
        assert_eq!(bucket.available(), u32::MAX);
    }

    #[test]
    fn test_builder() {
        let bucket = StandardRetryTokenBucket::builder()
            .capacity(20)
            .retry_cost(2)
            .circuit_breaker_mode(false)
            .build();
        assert_eq!(bucket.capacity(), 20);
        assert_eq!(bucket.config().retry_cost, 2);
        assert!(!bucket.config().circuit_breaker_mode);
    }
}
