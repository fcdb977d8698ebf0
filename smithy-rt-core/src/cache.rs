//! Read-through caching of expiring values.
//!
//! [`ReadThroughCache`] memoizes values such as resolved credentials or
//! endpoint configuration. Every entry carries its own expiry; expired
//! entries are removed by a lazy sweep that only runs from inside
//! [`ReadThroughCache::get`], at most once per `minimum_sweep_period`.
//!
//! The whole cache sits behind one async mutex that stays locked while the
//! caller-supplied lookup runs. A slow lookup therefore blocks other cache
//! operations, but concurrent callers asking for the same missing key never
//! trigger more than one lookup.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

use crate::time::{add_saturating, Clock, SystemClock};

/// A value paired with the instant it stops being usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringValue<V> {
    /// The wrapped value.
    pub value: V,
    /// The first instant at which the value is expired.
    pub expires_at: DateTime<Utc>,
}

impl<V> ExpiringValue<V> {
    /// Wrap a value with an absolute expiry.
    pub fn new(value: V, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    /// Wrap a value that expires `ttl` after `now`.
    pub fn expires_in(value: V, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::new(value, add_saturating(now, ttl))
    }

    /// Whether the value is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, ExpiringValue<V>>,
    next_sweep: DateTime<Utc>,
}

/// A cache that fills itself from a lookup function on miss or expiry.
pub struct ReadThroughCache<K, V> {
    minimum_sweep_period: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache using the system clock.
    #[must_use]
    pub fn new(minimum_sweep_period: Duration) -> Self {
        Self::with_clock(minimum_sweep_period, SystemClock::shared())
    }

    /// Create a cache driven by the given clock.
    ///
    /// A `minimum_sweep_period` of zero sweeps on every `get`.
    #[must_use]
    pub fn with_clock(minimum_sweep_period: Duration, clock: Arc<dyn Clock>) -> Self {
        let next_sweep = add_saturating(clock.now(), minimum_sweep_period);
        Self {
            minimum_sweep_period,
            clock,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_sweep,
            }),
        }
    }

    /// The configured minimum time between sweeps.
    #[must_use]
    pub fn minimum_sweep_period(&self) -> Duration {
        self.minimum_sweep_period
    }

    /// Get the value for `key`, calling `lookup` if it is absent or expired.
    ///
    /// The lookup runs while the cache lock is held. If it fails the error is
    /// returned as-is and the cache is left untouched.
    pub async fn get<F, Fut, E>(&self, key: K, lookup: F) -> Result<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<ExpiringValue<V>, E>>,
    {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if now >= state.next_sweep {
            let before = state.entries.len();
            state.entries.retain(|_, v| !v.is_expired(now));
            state.next_sweep = add_saturating(now, self.minimum_sweep_period);
            trace!(
                removed = before - state.entries.len(),
                remaining = state.entries.len(),
                "Swept expired cache entries"
            );
        }

        if let Some(entry) = state.entries.get(&key) {
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }

        let fresh = lookup(key.clone()).await?;
        let value = fresh.value.clone();
        state.entries.insert(key, fresh);
        Ok(value)
    }

    /// Remove the entry for `key` regardless of its expiry. No-op if absent.
    pub async fn invalidate(&self, key: &K) {
        self.state.lock().await.entries.remove(key);
    }

    /// Number of stored entries.
    ///
    /// This does not sweep, so the count may be stale: it can include
    /// entries that are expired but not yet removed.
    pub async fn size(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

impl<K, V> fmt::Debug for ReadThroughCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("minimum_sweep_period", &self.minimum_sweep_period)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
