//! # smithy-rt
//!
//! The client runtime core that Smithy-generated SDKs execute operations on.
//!
//! ## Quick Start
//!
//! ```ignore
//! use smithy_rt::prelude::*;
//! use std::sync::Arc;
//!
//! let tracer = DefaultTracer::new(Arc::new(LoggingProbe::new())).with_client_name("Weather");
//!
//! let execution = OperationExecution::<GetForecast>::builder(
//!     Arc::new(ForecastSerializer),
//!     Arc::new(http_transport),
//!     Arc::new(ForecastDeserializer),
//! )
//! .interceptor(Arc::new(LoggingInterceptor::new()))
//! .retry_strategy(Arc::new(
//!     StandardRetryStrategy::builder()
//!         .max_attempts(5)
//!         .configure_backoff(|b| b.set_max_backoff(Duration::from_secs(5)))?
//!         .build(),
//! ))
//! .build();
//!
//! let ctx = ExecutionContext::new("GetForecast", &tracer);
//! let forecast = execution.execute(input, &ctx).await?;
//! ```
//!
//! ## Architecture
//!
//! - [`smithy_rt_core`]: errors, typed attributes, clocks, the
//!   read-through cache and builder properties
//! - [`smithy_rt_tracing`]: spans, tracers and probes
//! - [`smithy_rt_retries`]: token buckets, backoff, retry policies and
//!   strategies
//! - [`smithy_rt_operation`]: the interceptor pipeline that executes an
//!   operation

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Errors, attributes, clocks and caching.
pub use smithy_rt_core as core;

/// Spans, tracers and probes.
pub use smithy_rt_tracing as tracing;

/// Retry strategies, policies and token buckets.
pub use smithy_rt_retries as retries;

/// Operation execution and interceptors.
pub use smithy_rt_operation as operation;

// ============================================================================
// Type Re-exports
// ============================================================================

pub use smithy_rt_core::{
    AttributeKey, Attributes, Clock, CoreError, ExpiringValue, ManualClock, ReadThroughCache,
    SystemClock,
};

pub use smithy_rt_tracing::{
    with_child_span, with_span, DefaultTracer, LoggingProbe, MultiProbe, NestedTracer, NoOpProbe,
    RecordingProbe, SpanStatus, TraceLevel, TraceProbe, TraceSpan, Tracer,
};

pub use smithy_rt_retries::{
    retry_with, AcceptorRetryPolicy, ErrorMetadata, ExponentialBackoffWithJitter,
    InfiniteTokenBucket, NoRetryPolicy, NoRetryStrategy, Outcome, RetryError, RetryErrorType,
    RetryPolicy, RetryStrategy, StandardRetryPolicy, StandardRetryStrategy,
    StandardRetryStrategyConfig, StandardRetryTokenBucket, TokenBucket,
};

pub use smithy_rt_operation::{
    AttemptMetricsInterceptor, Deserializer, ExecutionContext, Interceptor, LoggingInterceptor,
    OperationExecution, OperationShape, Serializer, Signer, Transport,
};

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient prelude for common imports.
///
/// ```ignore
/// use smithy_rt::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use crate::core::{
        AttributeKey, Clock, CoreError, ExpiringValue, ReadThroughCache, SystemClock,
    };

    // Tracing
    pub use crate::tracing::{
        DefaultTracer, LoggingProbe, SpanStatus, TraceProbe, TraceSpan, Tracer,
    };

    // Retries
    pub use crate::retries::{
        ErrorMetadata, Outcome, RetryError, RetryErrorType, RetryPolicy, RetryStrategy,
        StandardRetryPolicy, StandardRetryStrategy, StandardRetryStrategyConfig, TokenBucket,
    };

    // Operation
    pub use crate::operation::{
        Deserializer, ExecutionContext, Interceptor, LoggingInterceptor, OperationExecution,
        OperationShape, Serializer, Signer, Transport,
    };

    pub use std::sync::Arc;
    pub use std::time::Duration;
}

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of smithy-rt.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
