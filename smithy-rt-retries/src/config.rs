//! Retry configuration.
//!
//! Plain, serializable settings for the standard retry stack. Durations are
//! written as floating-point seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`StandardRetryStrategy`](crate::StandardRetryStrategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardRetryStrategyConfig {
    /// Maximum attempts per execution, including the first.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub backoff: ExponentialBackoffConfig,
    /// Shared retry capacity.
    pub token_bucket: TokenBucketConfig,
}

impl Default for StandardRetryStrategyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: ExponentialBackoffConfig::default(),
            token_bucket: TokenBucketConfig::default(),
        }
    }
}

impl StandardRetryStrategyConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts. Values below one are treated as one.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the backoff settings.
    #[must_use]
    pub fn backoff(mut self, backoff: ExponentialBackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the token bucket settings.
    #[must_use]
    pub fn token_bucket(mut self, token_bucket: TokenBucketConfig) -> Self {
        self.token_bucket = token_bucket;
        self
    }

    /// Config that makes a single attempt.
    pub fn no_retry() -> Self {
        Self::new().max_attempts(1)
    }
}

/// Settings for exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoffConfig {
    /// Delay before the first retry, before jitter.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Growth factor per attempt.
    pub scale_factor: f64,
    /// Upper bound on any single delay.
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Proportion of the delay that may be removed at random, 0.0 to 1.0.
    ///
    /// 1.0 is full jitter: delays are drawn uniformly from zero to the
    /// computed delay.
    pub jitter: f64,
}

impl Default for ExponentialBackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            scale_factor: 2.0,
            max_backoff: Duration::from_secs(20),
            jitter: 1.0,
        }
    }
}

/// Settings for the standard retry token bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBucketConfig {
    /// Maximum units the bucket holds.
    pub capacity: u32,
    /// Units taken by a first attempt.
    pub initial_try_cost: u32,
    /// Units taken by a retry.
    pub retry_cost: u32,
    /// Units taken by a retry after a transient failure.
    pub timeout_retry_cost: u32,
    /// Extra units returned when an attempt succeeds.
    pub success_increment: u32,
    /// Units added back per second of elapsed time. Zero disables refill.
    pub refill_units_per_second: u32,
    /// Fail acquisitions immediately instead of waiting for capacity.
    pub circuit_breaker_mode: bool,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            initial_try_cost: 0,
            retry_cost: 5,
            timeout_retry_cost: 10,
            success_increment: 1,
            refill_units_per_second: 10,
            circuit_breaker_mode: true,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StandardRetryStrategyConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(10));
        assert_eq!(config.token_bucket.capacity, 500);
        assert!(config.token_bucket.circuit_breaker_mode);
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(StandardRetryStrategyConfig::new().max_attempts(0).max_attempts, 1);
        assert_eq!(StandardRetryStrategyConfig::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "max_attempts": 5,
            "backoff": { "initial_delay": 0.25, "max_backoff": 2.0 },
            "token_bucket": { "capacity": 50, "circuit_breaker_mode": false }
        }"#;
        let config: StandardRetryStrategyConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(250));
        assert_eq!(config.backoff.max_backoff, Duration::from_secs(2));
        assert_eq!(config.backoff.scale_factor, 2.0);
        assert_eq!(config.token_bucket.capacity, 50);
        assert_eq!(config.token_bucket.retry_cost, 5);
        assert!(!config.token_bucket.circuit_breaker_mode);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let json = r#"{ "initial_delay": -1.0 }"#;
        assert!(serde_json::from_str::<ExponentialBackoffConfig>(json).is_err());
    }
}
