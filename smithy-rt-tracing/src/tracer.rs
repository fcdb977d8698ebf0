//! Tracers create root spans.

use smithy_rt_core::{Clock, SystemClock};
use std::fmt;
use std::sync::Arc;

use crate::probe::TraceProbe;
use crate::span::TraceSpan;

/// Creates root spans for new units of work.
pub trait Tracer: Send + Sync + fmt::Debug {
    /// Create a new root span.
    fn create_root_span(&self, id: &str) -> TraceSpan;
}

/// A tracer that reports every span to one probe.
#[derive(Clone)]
pub struct DefaultTracer {
    probe: Arc<dyn TraceProbe>,
    clock: Arc<dyn Clock>,
    client_name: Option<String>,
}

impl DefaultTracer {
    /// Create a tracer using the system clock.
    #[must_use]
    pub fn new(probe: Arc<dyn TraceProbe>) -> Self {
        Self {
            probe,
            clock: SystemClock::shared(),
            client_name: None,
        }
    }

    /// Use a different clock for event timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Prefix root span ids with a client name, as `"{client}-{id}"`.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }
}

impl Tracer for DefaultTracer {
    fn create_root_span(&self, id: &str) -> TraceSpan {
        let id = match &self.client_name {
            Some(client) => format!("{client}-{id}"),
            None => id.to_string(),
        };
        TraceSpan::root(id, Arc::clone(&self.probe), Arc::clone(&self.clock))
    }
}

impl fmt::Debug for DefaultTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultTracer")
            .field("probe", &self.probe)
            .field("client_name", &self.client_name)
            .finish()
    }
}

/// A tracer whose root spans are children of an existing span.
///
/// This attaches a component's spans to a caller-provided trace tree
/// without the component knowing about the caller's tracer.
#[derive(Debug, Clone)]
pub struct NestedTracer {
    parent: TraceSpan,
    prefix: Option<String>,
}

impl NestedTracer {
    /// Nest new roots under `parent`.
    #[must_use]
    pub fn new(parent: TraceSpan) -> Self {
        Self {
            parent,
            prefix: None,
        }
    }

    /// Prepend `prefix` to every root id.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl Tracer for NestedTracer {
    fn create_root_span(&self, id: &str) -> TraceSpan {
        match &self.prefix {
            Some(prefix) => self.parent.child(format!("{prefix}{id}")),
            None => self.parent.child(id),
        }
    }
}
