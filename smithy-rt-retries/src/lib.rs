//! # smithy-rt-retries
//!
//! Retry strategies, policies and token buckets for the smithy-rt client
//! runtime.
//!
//! ## Core Concepts
//!
//! - **[`RetryPolicy`]**: classifies one attempt result as success, final
//!   failure or retryable failure
//! - **[`RetryStrategy`]**: runs attempts until the policy says stop
//! - **[`TokenBucket`]**: client-wide retry capacity; every attempt holds a
//!   [`RetryToken`]
//! - **[`DelayProvider`]**: backoff between attempts
//! - **[`Outcome`]**: the final value or error plus the attempt count
//!
//! ## Policies
//!
//! - [`StandardRetryPolicy`]: throttling, transient and 5xx errors retry
//! - [`AcceptorRetryPolicy`]: ordered match rules with a fallback
//! - [`NoRetryPolicy`]: never retries
//!
//! ## Example
//!
//! ```ignore
//! use smithy_rt_retries::{retry_with, StandardRetryPolicy, StandardRetryStrategy};
//!
//! let strategy = StandardRetryStrategy::builder()
//!     .max_attempts(5)
//!     .configure_token_bucket(|b| b.set_capacity(100))?
//!     .build();
//!
//! let outcome = retry_with(&strategy, &StandardRetryPolicy::new(), &span, |attempt| {
//!     call_service(attempt)
//! })
//! .await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod acceptor;
pub mod backoff;
pub mod bucket;
pub mod config;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod standard;
pub mod strategy;

pub use acceptor::{Acceptor, AcceptorRetryPolicy, AcceptorState, Matcher, OutputPredicate};
pub use backoff::{
    DelayProvider, ExponentialBackoffBuilder, ExponentialBackoffWithJitter, FixedDelay, NoDelay,
};
pub use bucket::{
    InfiniteTokenBucket, RetryToken, StandardRetryTokenBucket, StandardRetryTokenBucketBuilder,
    TokenBucket, TokenOutcome, TokenRelease,
};
pub use config::{ExponentialBackoffConfig, StandardRetryStrategyConfig, TokenBucketConfig};
pub use error::{ErrorMetadata, RetryError, RetryErrorType, RetryResult};
pub use outcome::Outcome;
pub use policy::{NoRetryPolicy, RetryDirective, RetryPolicy, StandardRetryPolicy};
pub use standard::{StandardRetryStrategy, StandardRetryStrategyBuilder};
pub use strategy::{retry_with, AttemptFn, AttemptFuture, NoRetryStrategy, RetryStrategy};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        retry_with, ErrorMetadata, Outcome, RetryDirective, RetryError, RetryErrorType, RetryPolicy,
        RetryStrategy, StandardRetryPolicy, StandardRetryStrategy, TokenBucket,
    };
}
