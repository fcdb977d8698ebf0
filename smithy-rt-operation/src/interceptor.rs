//! The interceptor hook set.
//!
//! Hooks run in this order for every execution, each across all
//! interceptors in registration order before the next hook starts:
//!
//! ```text
//! read_before_execution
//! modify_before_serialization
//! read_before_serialization
//!     [serialize]
//! read_after_serialization
//! modify_before_retry_loop
//!     per attempt:
//!     read_before_attempt
//!     modify_before_signing
//!     read_before_signing
//!         [sign]
//!     read_after_signing
//!     modify_before_transmit
//!     read_before_transmit
//!         [transmit]
//!     read_after_transmit
//!     modify_before_deserialization
//!     read_before_deserialization
//!         [deserialize]
//!     read_after_deserialization
//!     modify_before_attempt_completion
//!     read_after_attempt
//! modify_before_completion
//! read_after_execution
//! ```
//!
//! An error from any hook before the retry loop skips straight to
//! `modify_before_completion` with that error as the result. An error from
//! a per-attempt hook skips to `read_after_attempt` with that error as the
//! attempt result, and the retry policy then decides as usual.
//!
//! `read_before_execution`, `read_before_attempt`, `read_after_attempt` and
//! `read_after_execution` run every interceptor even if one fails. The last
//! error wins; earlier ones are kept as suppressed errors on the
//! [`ExecutionContext`](crate::ExecutionContext). The result hooks
//! (`modify_before_attempt_completion`, `modify_before_completion`) replace
//! the result with a hook's error and keep going.
//!
//! Read hooks must not mutate shared state.

use async_trait::async_trait;
use std::fmt;

use crate::context::{
    InputContext, InputMut, OutputContext, OutputMut, RequestContext, RequestMut, ResponseContext,
    ResponseMut,
};
use crate::shape::OperationShape;

/// Hooks into the execution of operation `S`. Every hook defaults to a
/// no-op.
#[async_trait]
#[allow(unused_variables)]
pub trait Interceptor<S: OperationShape>: Send + Sync + fmt::Debug {
    /// First hook of every execution.
    async fn read_before_execution(&self, ctx: &InputContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the input before serialization.
    async fn modify_before_serialization(&self, ctx: InputMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the input about to be serialized.
    async fn read_before_serialization(&self, ctx: &InputContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the serialized request.
    async fn read_after_serialization(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the request before any attempt is made.
    async fn modify_before_retry_loop(&self, ctx: RequestMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Start of every attempt.
    async fn read_before_attempt(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the request before signing.
    async fn modify_before_signing(&self, ctx: RequestMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the request about to be signed.
    async fn read_before_signing(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the signed request.
    async fn read_after_signing(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the request before transmission.
    async fn modify_before_transmit(&self, ctx: RequestMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the request about to be sent.
    async fn read_before_transmit(&self, ctx: &RequestContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the raw response.
    async fn read_after_transmit(&self, ctx: &ResponseContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the response before deserialization.
    async fn modify_before_deserialization(&self, ctx: ResponseMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the response about to be deserialized.
    async fn read_before_deserialization(
        &self,
        ctx: &ResponseContext<'_, S>,
    ) -> Result<(), S::Error> {
        Ok(())
    }

    /// Observe the deserialized result.
    async fn read_after_deserialization(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the attempt result.
    async fn modify_before_attempt_completion(
        &self,
        ctx: OutputMut<'_, S>,
    ) -> Result<(), S::Error> {
        Ok(())
    }

    /// End of every attempt, including failed ones.
    async fn read_after_attempt(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Replace the execution result.
    async fn modify_before_completion(&self, ctx: OutputMut<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }

    /// Last hook of every execution.
    async fn read_after_execution(&self, ctx: &OutputContext<'_, S>) -> Result<(), S::Error> {
        Ok(())
    }
}
