//! # smithy-rt-operation
//!
//! The operation execution pipeline for the smithy-rt client runtime.
//!
//! ## Core Concepts
//!
//! - **[`OperationShape`]**: the input, output, request, response and error
//!   types of one operation
//! - **[`Serializer`]**, **[`Signer`]**, **[`Transport`]**,
//!   **[`Deserializer`]**: the collaborators a generated client supplies
//! - **[`Interceptor`]**: hooks around every stage of an execution
//! - **[`OperationExecution`]**: runs the stages in order inside the retry
//!   loop
//! - **[`ExecutionContext`]**: per-execution span, attributes and
//!   suppressed errors
//!
//! ## Example
//!
//! ```ignore
//! use smithy_rt_operation::{ExecutionContext, LoggingInterceptor, OperationExecution};
//! use std::sync::Arc;
//!
//! let execution = OperationExecution::<GetObject>::builder(
//!     Arc::new(GetObjectSerializer),
//!     Arc::new(http_transport),
//!     Arc::new(GetObjectDeserializer),
//! )
//! .interceptor(Arc::new(LoggingInterceptor::new()))
//! .build();
//!
//! let ctx = ExecutionContext::new("GetObject", &tracer);
//! let output = execution.execute(input, &ctx).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod context;
pub mod execution;
pub mod interceptor;
pub mod interceptors;
pub mod shape;

pub use context::{
    ExecutionContext, InputContext, InputMut, OutputContext, OutputMut, RequestContext, RequestMut,
    ResponseContext, ResponseMut,
};
pub use execution::{OperationExecution, OperationExecutionBuilder};
pub use interceptor::Interceptor;
pub use interceptors::{AttemptMetricsInterceptor, LoggingInterceptor};
pub use shape::{Deserializer, NoSigner, OperationShape, Serializer, Signer, Transport};
