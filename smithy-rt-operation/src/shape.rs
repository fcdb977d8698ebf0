//! Operation shapes and the collaborators that move them over the wire.

use async_trait::async_trait;
use smithy_rt_retries::{ErrorMetadata, RetryError};
use std::error::Error as StdError;

use crate::context::ExecutionContext;

/// The types involved in one modeled operation.
///
/// Generated clients implement this on a marker type per operation.
pub trait OperationShape: Send + Sync + 'static {
    /// Modeled input.
    type Input: Send + Sync + 'static;
    /// Modeled output.
    type Output: Send + Sync + 'static;
    /// Transmittable request.
    type Request: Clone + Send + Sync + 'static;
    /// Transmittable response.
    type Response: Send + Sync + 'static;
    /// Operation error. Runtime conditions such as cancellation reach the
    /// caller through `From<RetryError>`.
    type Error: StdError + ErrorMetadata + From<RetryError> + Send + Sync + 'static;
}

/// Turns modeled input into a transmittable request.
#[async_trait]
pub trait Serializer<S: OperationShape>: Send + Sync {
    /// Serialize `input`.
    async fn serialize(
        &self,
        input: &S::Input,
        ctx: &ExecutionContext,
    ) -> Result<S::Request, S::Error>;
}

/// Signs a request before transmission. Runs once per attempt.
#[async_trait]
pub trait Signer<S: OperationShape>: Send + Sync {
    /// Sign `request` in place.
    async fn sign(&self, request: &mut S::Request, ctx: &ExecutionContext) -> Result<(), S::Error>;
}

/// Sends a request and returns the raw response.
#[async_trait]
pub trait Transport<S: OperationShape>: Send + Sync {
    /// Send `request`.
    async fn send(
        &self,
        request: &S::Request,
        ctx: &ExecutionContext,
    ) -> Result<S::Response, S::Error>;
}

/// Turns a raw response into modeled output or a modeled error.
#[async_trait]
pub trait Deserializer<S: OperationShape>: Send + Sync {
    /// Deserialize `response`.
    async fn deserialize(
        &self,
        response: &S::Response,
        ctx: &ExecutionContext,
    ) -> Result<S::Output, S::Error>;
}

/// Leaves requests unsigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

#[async_trait]
impl<S: OperationShape> Signer<S> for NoSigner {
    async fn sign(
        &self,
        _request: &mut S::Request,
        _ctx: &ExecutionContext,
    ) -> Result<(), S::Error> {
        Ok(())
    }
}
