//! # smithy-rt-core
//!
//! Core building blocks for the smithy-rt client runtime.
//!
//! This crate provides the pieces shared by every other runtime crate:
//!
//! - **Time**: the injectable [`Clock`] with [`SystemClock`] and the
//!   deterministic [`ManualClock`] for tests
//! - **Attributes**: a typed heterogeneous map used by execution contexts
//!   and trace spans
//! - **Cache**: [`ReadThroughCache`] of [`ExpiringValue`]s, used to memoize
//!   credentials and resolved configuration
//! - **Properties**: [`DslProperty`], the state of a nested builder property
//!
//! ## Example
//!
//! ```rust,ignore
//! use smithy_rt_core::{ExpiringValue, ReadThroughCache};
//! use std::time::Duration;
//!
//! let cache = ReadThroughCache::new(Duration::from_secs(60));
//! let creds = cache
//!     .get("default", |profile| async move {
//!         let creds = fetch_credentials(&profile).await?;
//!         Ok(ExpiringValue::new(creds.clone(), creds.expiration))
//!     })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attributes;
pub mod cache;
pub mod error;
pub mod property;
pub mod time;

pub use attributes::{AttributeKey, Attributes};
pub use cache::{ExpiringValue, ReadThroughCache};
pub use error::{CoreError, Result};
pub use property::{BuildInto, DslProperty};
pub use time::{Clock, ManualClock, SystemClock};
