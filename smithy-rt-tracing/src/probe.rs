//! Probes consume span lifecycle notifications and trace events.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

use crate::event::{MetricValue, TraceEvent, TraceEventData, TraceLevel};
use crate::span::{SpanStatus, TraceSpan};

/// A sink for trace data.
///
/// Probes are invoked synchronously from the posting code, so they should
/// hand off anything expensive.
pub trait TraceProbe: Send + Sync + fmt::Debug {
    /// A span was created.
    fn span_created(&self, _span: &TraceSpan) {}

    /// An event was posted to `span`.
    fn post_event(&self, span: &TraceSpan, event: &TraceEvent);

    /// Several events were posted to `span`, in order.
    fn post_events(&self, span: &TraceSpan, events: &[TraceEvent]) {
        for event in events {
            self.post_event(span, event);
        }
    }

    /// A span was closed.
    fn span_closed(&self, _span: &TraceSpan) {}
}

/// A probe that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProbe;

impl TraceProbe for NoOpProbe {
    fn post_event(&self, _span: &TraceSpan, _event: &TraceEvent) {}
}

/// A probe that forwards to several probes in registration order.
#[derive(Debug, Clone, Default)]
pub struct MultiProbe {
    probes: Vec<Arc<dyn TraceProbe>>,
}

impl MultiProbe {
    /// Create an empty fan-out probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn TraceProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Number of registered probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether no probes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl FromIterator<Arc<dyn TraceProbe>> for MultiProbe {
    fn from_iter<I: IntoIterator<Item = Arc<dyn TraceProbe>>>(iter: I) -> Self {
        Self {
            probes: iter.into_iter().collect(),
        }
    }
}

impl TraceProbe for MultiProbe {
    fn span_created(&self, span: &TraceSpan) {
        for probe in &self.probes {
            probe.span_created(span);
        }
    }

    fn post_event(&self, span: &TraceSpan, event: &TraceEvent) {
        for probe in &self.probes {
            probe.post_event(span, event);
        }
    }

    fn post_events(&self, span: &TraceSpan, events: &[TraceEvent]) {
        for probe in &self.probes {
            probe.post_events(span, events);
        }
    }

    fn span_closed(&self, span: &TraceSpan) {
        for probe in &self.probes {
            probe.span_closed(span);
        }
    }
}

/// A probe that forwards events to the `tracing` ecosystem.
///
/// Message bodies are rendered only when both this probe's minimum level
/// and the active `tracing` subscriber accept the event.
#[derive(Debug, Clone, Copy)]
pub struct LoggingProbe {
    min_level: TraceLevel,
}

impl Default for LoggingProbe {
    fn default() -> Self {
        Self {
            min_level: TraceLevel::Trace,
        }
    }
}

impl LoggingProbe {
    /// Create a probe that forwards every level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only forward events at `level` or more severe.
    #[must_use]
    pub fn min_level(mut self, level: TraceLevel) -> Self {
        self.min_level = level;
        self
    }
}

macro_rules! forward {
    ($level:expr, $span:expr, $event:expr) => {
        if tracing::enabled!($level) {
            let span_id = $span.qualified_id();
            let component = $event.source_component.as_str();
            match &$event.data {
                TraceEventData::Message { content, error: Some(error) } => {
                    tracing::event!(
                        $level,
                        span = %span_id,
                        component,
                        error = %error,
                        "{}",
                        content.render()
                    );
                }
                TraceEventData::Message { content, error: None } => {
                    tracing::event!($level, span = %span_id, component, "{}", content.render());
                }
                TraceEventData::Metric { name, value: MetricValue::Count(count) } => {
                    tracing::event!(
                        $level,
                        span = %span_id,
                        component,
                        metric = %name,
                        count,
                        "metric"
                    );
                }
                TraceEventData::Metric { name, value: MetricValue::Duration(elapsed) } => {
                    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                    tracing::event!(
                        $level,
                        span = %span_id,
                        component,
                        metric = %name,
                        elapsed_ms,
                        "metric"
                    );
                }
            }
        }
    };
}

impl TraceProbe for LoggingProbe {
    fn span_created(&self, span: &TraceSpan) {
        tracing::trace!(span = %span.qualified_id(), "Span created");
    }

    fn post_event(&self, span: &TraceSpan, event: &TraceEvent) {
        if !event.level.is_enabled_for(self.min_level) {
            return;
        }
        match event.level {
            TraceLevel::Fatal | TraceLevel::Error => forward!(Level::ERROR, span, event),
            TraceLevel::Warning => forward!(Level::WARN, span, event),
            TraceLevel::Info => forward!(Level::INFO, span, event),
            TraceLevel::Debug => forward!(Level::DEBUG, span, event),
            TraceLevel::Trace => forward!(Level::TRACE, span, event),
        }
    }

    fn span_closed(&self, span: &TraceSpan) {
        tracing::debug!(span = %span.qualified_id(), status = ?span.status(), "Span closed");
    }
}

/// An event captured by a [`RecordingProbe`].
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Qualified id of the span the event was posted to.
    pub span: String,
    /// The event.
    pub event: TraceEvent,
}

#[derive(Debug, Default)]
struct Recording {
    created: Vec<String>,
    events: Vec<RecordedEvent>,
    closed: Vec<(String, SpanStatus)>,
}

/// A probe that keeps everything in memory.
///
/// Useful for tests and for debugging a single execution.
#[derive(Debug, Default)]
pub struct RecordingProbe {
    recording: Mutex<Recording>,
}

impl RecordingProbe {
    /// Create an empty recording probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualified ids of created spans, in creation order.
    #[must_use]
    pub fn created_spans(&self) -> Vec<String> {
        self.recording.lock().created.clone()
    }

    /// Qualified ids and final statuses of closed spans, in close order.
    #[must_use]
    pub fn closed_spans(&self) -> Vec<(String, SpanStatus)> {
        self.recording.lock().closed.clone()
    }

    /// All recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.recording.lock().events.clone()
    }

    /// Rendered bodies of all message events.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.event.render_message())
            .collect()
    }

    /// Rendered bodies of message events from `component`.
    #[must_use]
    pub fn messages_from(&self, component: &str) -> Vec<String> {
        self.events()
            .iter()
            .filter(|e| e.event.source_component == component)
            .filter_map(|e| e.event.render_message())
            .collect()
    }

    /// Metric events as `(name, value)` pairs.
    #[must_use]
    pub fn metrics(&self) -> Vec<(String, MetricValue)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.event.data {
                TraceEventData::Metric { name, value } => Some((name, value)),
                TraceEventData::Message { .. } => None,
            })
            .collect()
    }
}

impl TraceProbe for RecordingProbe {
    fn span_created(&self, span: &TraceSpan) {
        self.recording.lock().created.push(span.qualified_id());
    }

    fn post_event(&self, span: &TraceSpan, event: &TraceEvent) {
        self.recording.lock().events.push(RecordedEvent {
            span: span.qualified_id(),
            event: event.clone(),
        });
    }

    fn span_closed(&self, span: &TraceSpan) {
        let entry = (span.qualified_id(), span.status());
        self.recording.lock().closed.push(entry);
    }
}
