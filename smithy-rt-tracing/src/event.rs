//! Trace events.

use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Severity of a trace event, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TraceLevel {
    /// Unrecoverable failure.
    Fatal,
    /// Failure of the current operation.
    Error,
    /// Unexpected but recoverable condition.
    Warning,
    /// Normal progress.
    Info,
    /// Diagnostic detail.
    Debug,
    /// Very fine-grained diagnostic detail.
    Trace,
}

impl TraceLevel {
    /// Whether this level is at least as severe as `threshold`.
    #[must_use]
    pub fn is_enabled_for(self, threshold: TraceLevel) -> bool {
        self <= threshold
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        };
        f.write_str(name)
    }
}

/// A message body that is only computed when a probe consumes it.
#[derive(Clone)]
pub struct LazyMessage(Arc<dyn Fn() -> String + Send + Sync>);

impl LazyMessage {
    /// Wrap a message producer.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(producer))
    }

    /// Compute the message text.
    #[must_use]
    pub fn render(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for LazyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyMessage(..)")
    }
}

/// Error attached to a message event.
pub type EventError = Arc<dyn StdError + Send + Sync>;

/// Value of a metric event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    /// A count of occurrences.
    Count(u64),
    /// An elapsed duration.
    Duration(Duration),
}

/// Payload of a trace event.
#[derive(Debug, Clone)]
pub enum TraceEventData {
    /// A log message, optionally tied to an error.
    Message {
        /// Deferred message body.
        content: LazyMessage,
        /// Associated error, if any.
        error: Option<EventError>,
    },
    /// A named metric.
    Metric {
        /// Metric name.
        name: String,
        /// Metric value.
        value: MetricValue,
    },
}

/// An immutable record of something that happened within a span.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Severity.
    pub level: TraceLevel,
    /// Logical name of the emitting component.
    pub source_component: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: TraceEventData,
}

impl TraceEvent {
    /// Create a message event.
    pub fn message<F>(
        level: TraceLevel,
        source_component: impl Into<String>,
        timestamp: DateTime<Utc>,
        error: Option<EventError>,
        content: F,
    ) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            level,
            source_component: source_component.into(),
            timestamp,
            data: TraceEventData::Message {
                content: LazyMessage::new(content),
                error,
            },
        }
    }

    /// Create a metric event.
    pub fn metric(
        level: TraceLevel,
        source_component: impl Into<String>,
        timestamp: DateTime<Utc>,
        name: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            level,
            source_component: source_component.into(),
            timestamp,
            data: TraceEventData::Metric {
                name: name.into(),
                value,
            },
        }
    }

    /// Render the message body, if this is a message event.
    #[must_use]
    pub fn render_message(&self) -> Option<String> {
        match &self.data {
            TraceEventData::Message { content, .. } => Some(content.render()),
            TraceEventData::Metric { .. } => None,
        }
    }

    /// The attached error, if this is a message event carrying one.
    #[must_use]
    pub fn error(&self) -> Option<&EventError> {
        match &self.data {
            TraceEventData::Message { error, .. } => error.as_ref(),
            TraceEventData::Metric { .. } => None,
        }
    }
}
