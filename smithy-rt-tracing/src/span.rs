//! Trace spans.
//!
//! A [`TraceSpan`] names a logical unit of work. Spans form a tree through
//! [`TraceSpan::child`], record events for delivery to a [`TraceProbe`], and
//! report a final [`SpanStatus`].
//!
//! Spans are passed explicitly. Code that wants a child span for a scope
//! should use [`with_child_span`] or a [`SpanGuard`], both of which close
//! the span on every exit path, including cancellation.

use parking_lot::Mutex;
use smithy_rt_core::{AttributeKey, Attributes, Clock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::event::{EventError, MetricValue, TraceEvent, TraceLevel};
use crate::probe::TraceProbe;
use crate::tracer::Tracer;

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpanStatus {
    /// No status was recorded.
    #[default]
    Unset,
    /// The unit of work completed successfully.
    Ok,
    /// The unit of work failed.
    Error,
}

struct SpanInner {
    id: String,
    parent: Option<TraceSpan>,
    probe: Arc<dyn TraceProbe>,
    clock: Arc<dyn Clock>,
    attributes: Mutex<Attributes>,
    status: Mutex<SpanStatus>,
    closed: AtomicBool,
}

/// A handle to a span. Cloning the handle does not create a new span.
#[derive(Clone)]
pub struct TraceSpan {
    inner: Arc<SpanInner>,
}

impl TraceSpan {
    /// Create a root span reporting to `probe`.
    ///
    /// Tracers call this; components normally receive spans rather than
    /// creating roots themselves.
    pub fn root(id: impl Into<String>, probe: Arc<dyn TraceProbe>, clock: Arc<dyn Clock>) -> Self {
        Self::create(id.into(), None, probe, clock)
    }

    fn create(
        id: String,
        parent: Option<TraceSpan>,
        probe: Arc<dyn TraceProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let span = Self {
            inner: Arc::new(SpanInner {
                id,
                parent,
                probe,
                clock,
                attributes: Mutex::new(Attributes::new()),
                status: Mutex::new(SpanStatus::Unset),
                closed: AtomicBool::new(false),
            }),
        };
        span.inner.probe.span_created(&span);
        span
    }

    /// Create a child span of this one.
    ///
    /// Uniqueness of `id` among siblings is not checked.
    pub fn child(&self, id: impl Into<String>) -> TraceSpan {
        Self::create(
            id.into(),
            Some(self.clone()),
            Arc::clone(&self.inner.probe),
            Arc::clone(&self.inner.clock),
        )
    }

    /// This span's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The ids from the root down to this span, joined with `/`.
    #[must_use]
    pub fn qualified_id(&self) -> String {
        match &self.inner.parent {
            Some(parent) => format!("{}/{}", parent.qualified_id(), self.inner.id),
            None => self.inner.id.clone(),
        }
    }

    /// The parent span, if this is not a root.
    #[must_use]
    pub fn parent(&self) -> Option<&TraceSpan> {
        self.inner.parent.as_ref()
    }

    /// The clock this span timestamps events with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> SpanStatus {
        *self.inner.status.lock()
    }

    /// Record a final status.
    ///
    /// Only the transition out of [`SpanStatus::Unset`] is allowed. Returns
    /// whether the status changed.
    pub fn set_status(&self, status: SpanStatus) -> bool {
        let mut current = self.inner.status.lock();
        if *current != SpanStatus::Unset || status == SpanStatus::Unset {
            return false;
        }
        *current = status;
        true
    }

    /// Set a span attribute.
    pub fn set_attribute<T>(&self, key: &AttributeKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.attributes.lock().set(key, value);
    }

    /// Read a span attribute.
    pub fn attribute<T>(&self, key: &AttributeKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.attributes.lock().get(key)
    }

    /// A snapshot of all span attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.inner.attributes.lock().clone()
    }

    /// Whether the span has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Post one event.
    ///
    /// Events posted after close are logged and dropped; posting never fails.
    pub fn post_event(&self, event: TraceEvent) {
        if self.dropped_after_close(1) {
            return;
        }
        self.inner.probe.post_event(self, &event);
    }

    /// Post several events, preserving their order.
    pub fn post_events(&self, events: Vec<TraceEvent>) {
        if events.is_empty() || self.dropped_after_close(events.len()) {
            return;
        }
        self.inner.probe.post_events(self, &events);
    }

    fn dropped_after_close(&self, count: usize) -> bool {
        if self.is_closed() {
            warn!(
                span = %self.qualified_id(),
                count,
                "Dropping trace events posted after span close"
            );
            return true;
        }
        false
    }

    /// Close the span.
    ///
    /// Idempotent: the first call notifies the probe, later calls do nothing.
    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.inner.probe.span_closed(self);
        }
    }

    /// Post a message event at `level`.
    pub fn log<F>(&self, level: TraceLevel, component: &str, error: Option<EventError>, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let event = TraceEvent::message(level, component, self.inner.clock.now(), error, content);
        self.post_event(event);
    }

    /// Post a fatal message.
    pub fn fatal<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Fatal, component, None, content);
    }

    /// Post an error message.
    pub fn error<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Error, component, None, content);
    }

    /// Post an error message carrying the error that caused it.
    pub fn error_with<F>(&self, component: &str, error: EventError, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Error, component, Some(error), content);
    }

    /// Post a warning message.
    pub fn warn<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Warning, component, None, content);
    }

    /// Post a warning carrying the error that caused it.
    pub fn warn_with<F>(&self, component: &str, error: EventError, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Warning, component, Some(error), content);
    }

    /// Post an informational message.
    pub fn info<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Info, component, None, content);
    }

    /// Post a debug message.
    pub fn debug<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Debug, component, None, content);
    }

    /// Post a trace-level message.
    pub fn trace<F>(&self, component: &str, content: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.log(TraceLevel::Trace, component, None, content);
    }

    /// Post a count metric.
    pub fn count(&self, component: &str, name: &str, count: u64) {
        let event = TraceEvent::metric(
            TraceLevel::Info,
            component,
            self.inner.clock.now(),
            name,
            MetricValue::Count(count),
        );
        self.post_event(event);
    }

    /// Post a duration metric.
    pub fn timing(&self, component: &str, name: &str, elapsed: Duration) {
        let event = TraceEvent::metric(
            TraceLevel::Info,
            component,
            self.inner.clock.now(),
            name,
            MetricValue::Duration(elapsed),
        );
        self.post_event(event);
    }
}

impl fmt::Debug for TraceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSpan")
            .field("id", &self.qualified_id())
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes a span when dropped.
///
/// Call [`SpanGuard::finish`] on normal completion. If the guard is dropped
/// without finishing, the owning scope was cancelled: a warning is recorded
/// on the span and the span is closed with its status left as it was. A
/// drop during a panic is a failure instead: an unset span is marked
/// [`SpanStatus::Error`] before it closes.
#[derive(Debug)]
pub struct SpanGuard {
    span: TraceSpan,
    finished: bool,
}

impl SpanGuard {
    /// Guard `span`.
    #[must_use]
    pub fn new(span: TraceSpan) -> Self {
        Self {
            span,
            finished: false,
        }
    }

    /// The guarded span.
    #[must_use]
    pub fn span(&self) -> &TraceSpan {
        &self.span
    }

    /// Close the span normally.
    pub fn finish(mut self) {
        self.finished = true;
        self.span.close();
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.finished || self.span.is_closed() {
            return;
        }
        if std::thread::panicking() {
            self.span.set_status(SpanStatus::Error);
            self.span.error("SpanGuard", || "Span scope panicked".to_string());
        } else {
            self.span
                .warn("SpanGuard", || "Span scope cancelled before completion".to_string());
        }
        self.span.close();
    }
}

/// Run `f` in a new child span of `parent`.
///
/// An `Err` result marks an unset span as [`SpanStatus::Error`]. The span is
/// closed when `f` completes or when the returned future is dropped.
pub async fn with_child_span<F, Fut, T, E>(
    parent: &TraceSpan,
    id: impl Into<String>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(TraceSpan) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    scoped(parent.child(id), f).await
}

/// Run `f` in a new root span created by `tracer`.
pub async fn with_span<Tr, F, Fut, T, E>(tracer: &Tr, id: &str, f: F) -> Result<T, E>
where
    Tr: Tracer + ?Sized,
    F: FnOnce(TraceSpan) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    scoped(tracer.create_root_span(id), f).await
}

async fn scoped<F, Fut, T, E>(span: TraceSpan, f: F) -> Result<T, E>
where
    F: FnOnce(TraceSpan) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let guard = SpanGuard::new(span.clone());
    let result = f(span).await;
    if result.is_err() {
        guard.span().set_status(SpanStatus::Error);
    }
    guard.finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RecordingProbe;
    use crate::tracer::DefaultTracer;
    use smithy_rt_core::ManualClock;

    fn root(probe: &Arc<RecordingProbe>) -> TraceSpan {
        TraceSpan::root(
            "root",
            probe.clone(),
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[test]
    fn test_child_hierarchy() {
        let probe = Arc::new(RecordingProbe::new());
        let root = root(&probe);
        let child = root.child("GetObject");
        let grandchild = child.child("attempt-1");

        assert_eq!(grandchild.qualified_id(), "root/GetObject/attempt-1");
        assert_eq!(grandchild.parent().map(TraceSpan::id), Some("GetObject"));
        assert!(root.parent().is_none());
        assert_eq!(
            probe.created_spans(),
            vec!["root", "root/GetObject", "root/GetObject/attempt-1"]
        );
    }

    #[test]
    fn test_status_transitions_once() {
        let probe = Arc::new(RecordingProbe::new());
        let span = root(&probe);

        assert_eq!(span.status(), SpanStatus::Unset);
        assert!(!span.set_status(SpanStatus::Unset));
        assert!(span.set_status(SpanStatus::Ok));
        assert!(!span.set_status(SpanStatus::Error));
        assert_eq!(span.status(), SpanStatus::Ok);
    }

    #[test]
    fn test_close_is_idempotent_and_drops_late_events() {
        let probe = Arc::new(RecordingProbe::new());
        let span = root(&probe);

        span.info("Test", || "before close".to_string());
        span.close();
        span.close();
        span.info("Test", || "after close".to_string());

        assert_eq!(probe.closed_spans().len(), 1);
        assert_eq!(probe.messages(), vec!["before close"]);
    }

    #[test]
    fn test_post_events_preserves_order() {
        let probe = Arc::new(RecordingProbe::new());
        let span = root(&probe);
        let now = span.clock().now();

        span.post_events(
            (0..3)
                .map(|i| {
                    TraceEvent::message(TraceLevel::Debug, "Test", now, None, move || {
                        format!("event {i}")
                    })
                })
                .collect(),
        );

        assert_eq!(probe.messages(), vec!["event 0", "event 1", "event 2"]);
    }

    #[test]
    fn test_attributes() {
        const REGION: AttributeKey<String> = AttributeKey::new("Region");
        let probe = Arc::new(RecordingProbe::new());
        let span = root(&probe);

        span.set_attribute(&REGION, "us-west-2".to_string());
        assert_eq!(span.attribute(&REGION).as_deref(), Some("us-west-2"));
        assert_eq!(span.attributes().len(), 1);
    }

    #[tokio::test]
    async fn test_scope_error_sets_error_status() {
        let probe = Arc::new(RecordingProbe::new());
        let tracer = DefaultTracer::new(probe.clone());
        let mut captured = None;

        let result: Result<(), &str> = with_span(&tracer, "op", |span| {
            captured = Some(span);
            async { Err("boom") }
        })
        .await;

        let span = captured.unwrap();
        assert!(result.is_err());
        assert_eq!(span.status(), SpanStatus::Error);
        assert!(span.is_closed());
    }

    #[tokio::test]
    async fn test_scope_success_leaves_status_unset() {
        let probe = Arc::new(RecordingProbe::new());
        let parent = root(&probe);
        let mut captured = None;

        let value = with_child_span(&parent, "child", |span| {
            captured = Some(span);
            async { Ok::<_, ()>(5) }
        })
        .await
        .unwrap();

        let span = captured.unwrap();
        assert_eq!(value, 5);
        assert_eq!(span.status(), SpanStatus::Unset);
        assert!(span.is_closed());
    }

    #[tokio::test]
    async fn test_scope_explicit_ok_survives_close() {
        let probe = Arc::new(RecordingProbe::new());
        let parent = root(&probe);

        with_child_span(&parent, "child", |span| async move {
            span.set_status(SpanStatus::Ok);
            Ok::<_, ()>(())
        })
        .await
        .unwrap();

        assert_eq!(probe.closed_spans(), vec![("root/child".to_string(), SpanStatus::Ok)]);
    }

    #[tokio::test]
    async fn test_cancelled_scope_closes_span() {
        let probe = Arc::new(RecordingProbe::new());
        let parent = root(&probe);

        let scope = with_child_span(&parent, "slow", |_span| async {
            futures::future::pending::<Result<(), ()>>().await
        });
        let cancelled = tokio::time::timeout(Duration::from_millis(5), scope).await;

        assert!(cancelled.is_err());
        assert_eq!(probe.closed_spans(), vec![("root/slow".to_string(), SpanStatus::Unset)]);
        assert_eq!(probe.messages(), vec!["Span scope cancelled before completion"]);
    }

    #[test]
    fn test_panicking_scope_marks_span_failed() {
        let probe = Arc::new(RecordingProbe::new());
        let parent = root(&probe);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            futures::executor::block_on(with_child_span(
                &parent,
                "boom",
                |_span| -> futures::future::Ready<Result<(), ()>> { panic!("scope failed") },
            ))
        }));

        assert!(outcome.is_err());
        assert_eq!(probe.closed_spans(), vec![("root/boom".to_string(), SpanStatus::Error)]);
        assert_eq!(probe.messages(), vec!["Span scope panicked"]);
    }

    #[test]
    fn test_error_helpers_attach_cause() {
        #[derive(Debug)]
        struct Refused;

        impl fmt::Display for Refused {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("connection refused")
            }
        }

        impl std::error::Error for Refused {}

        let probe = Arc::new(RecordingProbe::new());
        let span = root(&probe);

        span.error_with("Transport", Arc::new(Refused), || "send failed".to_string());
        span.warn_with("Transport", Arc::new(Refused), || "retrying".to_string());
        span.warn("Transport", || "no cause".to_string());

        let events = probe.events();
        let levels: Vec<_> = events.iter().map(|e| e.event.level).collect();
        let causes: Vec<_> = events
            .iter()
            .map(|e| e.event.error().map(ToString::to_string))
            .collect();
        assert_eq!(levels, vec![TraceLevel::Error, TraceLevel::Warning, TraceLevel::Warning]);
        let refused = Some("connection refused".to_string());
        assert_eq!(causes, vec![refused.clone(), refused, None]);
    }
}
