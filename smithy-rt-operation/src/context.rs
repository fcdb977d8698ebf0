//! Execution state shared by the pipeline and its interceptors.
//!
//! [`ExecutionContext`] lives for one execution. The stage contexts are
//! short-lived views handed to interceptor hooks; each one only exposes
//! what exists at its stage. The input is always there, the request exists
//! from serialization on, the response from transmission on and the result
//! from deserialization on.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use smithy_rt_core::{AttributeKey, Attributes};
use smithy_rt_tracing::{EventError, TraceSpan, Tracer};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::shape::OperationShape;

const COMPONENT: &str = "OperationExecution";

/// State for one execution of an operation.
pub struct ExecutionContext {
    operation_name: String,
    execution_id: Uuid,
    span: TraceSpan,
    started_at: DateTime<Utc>,
    attributes: Mutex<Attributes>,
    attempt: AtomicU32,
    suppressed: Mutex<Vec<EventError>>,
}

impl ExecutionContext {
    /// Create a context whose span is a new root from `tracer`.
    pub fn new<T>(operation_name: impl Into<String>, tracer: &T) -> Self
    where
        T: Tracer + ?Sized,
    {
        let operation_name = operation_name.into();
        let span = tracer.create_root_span(&operation_name);
        Self::with_span(operation_name, span)
    }

    /// Create a context that reports to `span`.
    ///
    /// The execution closes `span` when it finishes.
    pub fn with_span(operation_name: impl Into<String>, span: TraceSpan) -> Self {
        let started_at = span.clock().now();
        Self {
            operation_name: operation_name.into(),
            execution_id: Uuid::new_v4(),
            span,
            started_at,
            attributes: Mutex::new(Attributes::new()),
            attempt: AtomicU32::new(0),
            suppressed: Mutex::new(Vec::new()),
        }
    }

    /// The operation name.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Unique id of this execution.
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// The execution span.
    pub fn span(&self) -> &TraceSpan {
        &self.span
    }

    /// When the context was created, by the span clock.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The current attempt, starting at 1. Zero before the first attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub(crate) fn begin_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    /// Read an attribute.
    pub fn attribute<T>(&self, key: &AttributeKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.attributes.lock().get(key)
    }

    /// Store an attribute.
    pub fn set_attribute<T>(&self, key: &AttributeKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.attributes.lock().set(key, value);
    }

    /// Snapshot of all attributes.
    pub fn attributes(&self) -> Attributes {
        self.attributes.lock().clone()
    }

    /// Record an error that lost to a later one.
    ///
    /// The error is kept for inspection and posted to the span.
    pub fn suppress<E>(&self, error: E, stage: &'static str)
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let error: EventError = Arc::new(error);
        let message = error.to_string();
        self.span.warn_with(COMPONENT, error.clone(), move || {
            format!("Suppressed error in {stage}: {message}")
        });
        self.suppressed.lock().push(error);
    }

    /// Errors suppressed so far, oldest first.
    pub fn suppressed_errors(&self) -> Vec<EventError> {
        self.suppressed.lock().clone()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operation_name", &self.operation_name)
            .field("execution_id", &self.execution_id)
            .field("span", &self.span)
            .field("attempt", &self.attempt())
            .field("suppressed", &self.suppressed.lock().len())
            .finish()
    }
}

/// View before serialization.
pub struct InputContext<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
}

/// Mutable view of the input.
pub struct InputMut<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input, replaceable.
    pub input: &'a mut S::Input,
}

/// View from serialization until transmission.
pub struct RequestContext<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmittable request.
    pub request: &'a S::Request,
}

/// Mutable view of the request.
pub struct RequestMut<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmittable request, replaceable.
    pub request: &'a mut S::Request,
}

/// View from transmission until deserialization.
pub struct ResponseContext<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmitted request.
    pub request: &'a S::Request,
    /// Raw response.
    pub response: &'a S::Response,
}

/// Mutable view of the response.
pub struct ResponseMut<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmitted request.
    pub request: &'a S::Request,
    /// Raw response, replaceable.
    pub response: &'a mut S::Response,
}

/// View once a result exists.
///
/// `request` and `response` are absent when the execution or attempt
/// failed before producing them.
pub struct OutputContext<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmittable request, if serialized.
    pub request: Option<&'a S::Request>,
    /// Raw response, if received.
    pub response: Option<&'a S::Response>,
    /// Modeled result.
    pub result: &'a Result<S::Output, S::Error>,
}

/// Mutable view of the result.
pub struct OutputMut<'a, S: OperationShape> {
    /// Execution state.
    pub execution: &'a ExecutionContext,
    /// Modeled input.
    pub input: &'a S::Input,
    /// Transmittable request, if serialized.
    pub request: Option<&'a S::Request>,
    /// Raw response, if received.
    pub response: Option<&'a S::Response>,
    /// Modeled result, replaceable.
    pub result: &'a mut Result<S::Output, S::Error>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use smithy_rt_core::SystemClock;
    use smithy_rt_tracing::{DefaultTracer, RecordingProbe};

    #[derive(Debug, thiserror::Error)]
    #[error("hook failed: {0}")]
    struct HookError(&'static str);

    const REGION: AttributeKey<String> = AttributeKey::new("region");

    #[test]
    fn test_context_basics() {
        let tracer = DefaultTracer::new(Arc::new(RecordingProbe::new())).with_client_name("S3");
        let ctx = ExecutionContext::new("GetObject", &tracer);
        let other = ExecutionContext::new("GetObject", &tracer);

        assert_eq!(ctx.operation_name(), "GetObject");
        assert_eq!(ctx.span().id(), "S3-GetObject");
        assert_ne!(ctx.execution_id(), other.execution_id());
        assert_eq!(ctx.attempt(), 0);

        ctx.set_attribute(&REGION, "us-west-2".to_string());
        assert_eq!(ctx.attribute(&REGION).as_deref(), Some("us-west-2"));
        assert_eq!(ctx.attributes().len(), 1);
    }

    #[test]
    fn test_suppressed_errors_are_kept_and_posted() {
        let probe = Arc::new(RecordingProbe::new());
        let span = TraceSpan::root("op", probe.clone(), SystemClock::shared());
        let ctx = ExecutionContext::with_span("Op", span);

        ctx.suppress(HookError("first"), "read_before_execution");
        ctx.suppress(HookError("second"), "read_after_attempt");

        let kept: Vec<_> = ctx.suppressed_errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(kept, vec!["hook failed: first", "hook failed: second"]);
        assert_eq!(
            probe.messages_from(COMPONENT),
            vec![
                "Suppressed error in read_before_execution: hook failed: first",
                "Suppressed error in read_after_attempt: hook failed: second",
            ]
        );
    }
}
