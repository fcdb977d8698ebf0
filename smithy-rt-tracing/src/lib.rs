//! # smithy-rt-tracing
//!
//! Hierarchical trace spans for the smithy-rt client runtime.
//!
//! ## Core Concepts
//!
//! - **[`TraceSpan`]**: a named unit of work with a parent, typed
//!   attributes and a final [`SpanStatus`]
//! - **[`TraceEvent`]**: a log message (rendered lazily) or a metric
//! - **[`TraceProbe`]**: receives span lifecycle notifications and events
//! - **[`Tracer`]**: creates root spans; [`NestedTracer`] grafts roots onto
//!   an existing span
//!
//! ## Probes
//!
//! - [`NoOpProbe`]: discards everything
//! - [`MultiProbe`]: fans out to several probes
//! - [`LoggingProbe`]: forwards to the `tracing` crate
//! - [`RecordingProbe`]: keeps everything in memory
//!
//! ## Example
//!
//! ```ignore
//! use smithy_rt_tracing::{with_span, DefaultTracer, LoggingProbe};
//! use std::sync::Arc;
//!
//! let tracer = DefaultTracer::new(Arc::new(LoggingProbe::new())).with_client_name("S3");
//! let result = with_span(&tracer, "GetObject", |span| async move {
//!     span.debug("Example", || "starting".to_string());
//!     do_work(&span).await
//! })
//! .await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod event;
pub mod probe;
pub mod span;
pub mod tracer;

pub use event::{EventError, LazyMessage, MetricValue, TraceEvent, TraceEventData, TraceLevel};
pub use probe::{LoggingProbe, MultiProbe, NoOpProbe, RecordedEvent, RecordingProbe, TraceProbe};
pub use span::{with_child_span, with_span, SpanGuard, SpanStatus, TraceSpan};
pub use tracer::{DefaultTracer, NestedTracer, Tracer};
