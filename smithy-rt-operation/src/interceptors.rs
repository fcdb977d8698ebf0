//! Built-in interceptors.

use async_trait::async_trait;
use smithy_rt_tracing::TraceLevel;
use tracing::debug;

use crate::context::{InputContext, OutputContext, RequestContext, ResponseContext};
use crate::interceptor::Interceptor;
use crate::shape::OperationShape;

/// Posts a debug event to the execution span at the main stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    const COMPONENT: &'static str = "LoggingInterceptor";

    /// Create a new logging interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<S: OperationShape> Interceptor<S> for LoggingInterceptor {
    async fn read_before_execution(&self, ctx: &InputContext<'_, S>) -> Result<(), S::Error> {
        let name = ctx.execution.operation_name().to_string();
        let id = ctx.execution.execution_id();
        ctx.execution
            .span()
            .debug(Self::COMPONENT, move || format!("Starting {name} ({id})"));
        Ok(())
    }

    async fn read_after_serialization(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        ctx.execution
            .span()
            .trace(Self::COMPONENT, || "Request serialized".to_string());
        Ok(())
    }

    async fn read_before_attempt(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        let attempt = ctx.execution.attempt();
        ctx.execution
            .span()
            .debug(Self::COMPONENT, move || format!("Attempt {attempt} starting"));
        Ok(())
    }

    async fn read_after_transmit(&self, ctx: &ResponseContext<'_, S>) -> Result<(), S::Error> {
        let attempt = ctx.execution.attempt();
        ctx.execution
            .span()
            .trace(Self::COMPONENT, move || format!("Attempt {attempt} received a response"));
        Ok(())
    }

    async fn read_after_attempt(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        let attempt = ctx.execution.attempt();
        let span = ctx.execution.span();
        match ctx.result {
            Ok(_) => span.debug(Self::COMPONENT, move || format!("Attempt {attempt} succeeded")),
            Err(e) => {
                let message = e.to_string();
                span.debug(Self::COMPONENT, move || format!("Attempt {attempt} failed: {message}"));
            }
        }
        Ok(())
    }

    async fn read_after_execution(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        let name = ctx.execution.operation_name().to_string();
        let attempts = ctx.execution.attempt();
        let (level, outcome) = match ctx.result {
            Ok(_) => (TraceLevel::Debug, "succeeded".to_string()),
            Err(e) => (TraceLevel::Warning, format!("failed: {e}")),
        };
        debug!(operation = %name, attempts, "Execution finished");
        ctx.execution.span().log(level, Self::COMPONENT, None, move || {
            format!("{name} {outcome} after {attempts} attempt(s)")
        });
        Ok(())
    }
}

/// Records attempt count and execution duration as span metrics.
///
/// Emits `attempts` (count) and `execution_duration` (duration) when the
/// execution finishes. The duration is measured from
/// [`ExecutionContext::started_at`](crate::ExecutionContext::started_at).
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptMetricsInterceptor;

impl AttemptMetricsInterceptor {
    const COMPONENT: &'static str = "AttemptMetricsInterceptor";

    /// Create a new metrics interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<S: OperationShape> Interceptor<S> for AttemptMetricsInterceptor {
    async fn read_after_execution(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        let span = ctx.execution.span();
        span.count(Self::COMPONENT, "attempts", u64::from(ctx.execution.attempt()));

        let elapsed = (span.clock().now() - ctx.execution.started_at())
            .to_std()
            .unwrap_or_default();
        span.timing(Self::COMPONENT, "execution_duration", elapsed);
        Ok(())
    }
}
