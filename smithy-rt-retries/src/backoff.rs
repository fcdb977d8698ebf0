//! Backoff delay providers.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smithy_rt_core::BuildInto;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExponentialBackoffConfig;

/// Computes the delay before a retry.
pub trait DelayProvider: Send + Sync + fmt::Debug {
    /// Delay to wait after attempt `attempt` (1-based) failed.
    fn backoff(&self, attempt: u32) -> Duration;
}

/// No delay between attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayProvider for NoDelay {
    fn backoff(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    /// Delay between attempts.
    pub delay: Duration,
}

impl FixedDelay {
    /// Create a new fixed delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayProvider for FixedDelay {
    fn backoff(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

enum JitterSource {
    Thread,
    Seeded(Mutex<StdRng>),
}

impl JitterSource {
    fn sample(&self) -> f64 {
        match self {
            Self::Thread => rand::thread_rng().gen::<f64>(),
            Self::Seeded(rng) => rng.lock().gen::<f64>(),
        }
    }
}

/// Exponential backoff with jitter.
///
/// The delay after attempt `n` is `initial_delay * scale_factor^(n-1)`,
/// capped at `max_backoff`, then reduced by a random fraction in
/// `[0, jitter]` drawn fresh on every call. With `jitter = 1.0` the delay is
/// uniform over `[0, computed delay]`.
pub struct ExponentialBackoffWithJitter {
    config: ExponentialBackoffConfig,
    source: JitterSource,
}

impl ExponentialBackoffWithJitter {
    /// Create a new backoff with the given settings.
    #[must_use]
    pub fn new(config: ExponentialBackoffConfig) -> Self {
        Self {
            config,
            source: JitterSource::Thread,
        }
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Use a seeded generator, for reproducible delays.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.source = JitterSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// The backoff settings.
    #[must_use]
    pub fn config(&self) -> &ExponentialBackoffConfig {
        &self.config
    }

    /// Delay after attempt `attempt` before jitter is applied.
    pub fn max_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base =
            self.config.initial_delay.as_secs_f64() * self.config.scale_factor.powi(exponent);
        let cap = self.config.max_backoff.as_secs_f64();
        let secs = if base.is_finite() { base.min(cap) } else { cap };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.config.max_backoff)
    }
}

impl DelayProvider for ExponentialBackoffWithJitter {
    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.max_delay_for(attempt);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        let factor = (1.0 - jitter * self.source.sample()).clamp(0.0, 1.0);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

impl Default for ExponentialBackoffWithJitter {
    fn default() -> Self {
        Self::new(ExponentialBackoffConfig::default())
    }
}

impl fmt::Debug for ExponentialBackoffWithJitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentialBackoffWithJitter")
            .field("config", &self.config)
            .field("seeded", &matches!(self.source, JitterSource::Seeded(_)))
            .finish()
    }
}

/// Builder for ExponentialBackoffWithJitter.
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Option<Duration>,
    scale_factor: Option<f64>,
    max_backoff: Option<Duration>,
    jitter: Option<f64>,
    seed: Option<u64>,
}

impl ExponentialBackoffBuilder {
    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.set_initial_delay(d);
        self
    }

    /// Set initial delay in place.
    pub fn set_initial_delay(&mut self, d: Duration) {
        self.initial_delay = Some(d);
    }

    /// Set scale factor.
    #[must_use]
    pub fn scale_factor(mut self, m: f64) -> Self {
        self.scale_factor = Some(m);
        self
    }

    /// Set max backoff.
    #[must_use]
    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.set_max_backoff(d);
        self
    }

    /// Set max backoff in place.
    pub fn set_max_backoff(&mut self, d: Duration) {
        self.max_backoff = Some(d);
    }

    /// Set jitter factor.
    #[must_use]
    pub fn jitter(mut self, j: f64) -> Self {
        self.set_jitter(j);
        self
    }

    /// Set jitter factor in place.
    pub fn set_jitter(&mut self, j: f64) {
        self.jitter = Some(j);
    }

    /// Seed the jitter generator.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.set_seed(seed);
        self
    }

    /// Seed the jitter generator in place.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    /// Build the backoff.
    #[must_use]
    pub fn build(self) -> ExponentialBackoffWithJitter {
        let mut config = ExponentialBackoffConfig::default();
        if let Some(v) = self.initial_delay {
            config.initial_delay = v;
        }
        if let Some(v) = self.scale_factor {
            config.scale_factor = v;
        }
        if let Some(v) = self.max_backoff {
            config.max_backoff = v;
        }
        if let Some(v) = self.jitter {
            config.jitter = v;
        }
        let backoff = ExponentialBackoffWithJitter::new(config);
        match self.seed {
            Some(seed) => backoff.with_seed(seed),
            None => backoff,
        }
    }
}

impl BuildInto<Arc<dyn DelayProvider>> for ExponentialBackoffBuilder {
    fn build_into(self) -> Arc<dyn DelayProvider> {
        Arc::new(self.build())
    }
}
