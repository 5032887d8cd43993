//! Span handles and start options

use opentelemetry::trace::{SpanContext, SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, ContextGuard, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// Handle to a started span
///
/// The span lives inside a [`Context`], so the handle and any context
/// derived from it refer to the same span. Finalization (tagging, events,
/// [`end`](Self::end)) is the caller's job; a span that is never ended is
/// ended when the last context holding it is dropped.
#[derive(Debug, Clone)]
pub struct ActiveSpan {
    cx: Context,
}

impl ActiveSpan {
    pub(crate) fn new(cx: Context) -> Self {
        Self { cx }
    }

    /// Context carrying this span as the current span
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Trace and span identifiers
    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    /// Whether the span records data (false for no-op and unsampled spans)
    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Set an attribute
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Add an event with attributes
    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    /// Record an error as an exception event
    pub fn record_error(&self, err: &dyn std::error::Error) {
        self.cx.span().record_error(err);
    }

    pub fn set_status(&self, status: Status) {
        self.cx.span().set_status(status);
    }

    /// Make this span current on this thread until the guard is dropped
    pub fn attach(&self) -> ContextGuard {
        self.cx.clone().attach()
    }

    /// End the span, handing it to the reporter
    pub fn end(self) {
        self.cx.span().end();
    }
}

/// Options passed through to the tracer when starting a span
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub(crate) parent: Option<Context>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) start_time: Option<SystemTime>,
}

impl SpanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the span as a child of the span active in `parent`
    pub fn with_parent(mut self, parent: Context) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add an attribute set at start time
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Override the start timestamp
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }
}
