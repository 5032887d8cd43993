//! Tracing clients

use crate::error::{Result, TracingError};
use crate::span::{ActiveSpan, SpanOptions};
use crate::zipkin::{self, ZipkinConfig};
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::{global, Context};
use opentelemetry_sdk::trace::{Tracer as SdkTracer, TracerProvider};

/// Instrumentation scope reported with every span
const TRACER_NAME: &str = "beacon";

/// Span creation contract
pub trait Client: Send + Sync {
    /// Start a span named `operation`
    ///
    /// The span is a child of the span active in `cx`, or a root span if
    /// there is none. The returned context is `cx` with the new span as the
    /// current span. `cx` is only consulted for the parent.
    fn start_span_from_context(&self, cx: &Context, operation: &str) -> (ActiveSpan, Context);

    /// Start a root span, unless `options` names a parent
    fn start_span(&self, operation: &str, options: SpanOptions) -> ActiveSpan;
}

fn start_child<T>(tracer: &T, cx: &Context, operation: &str) -> (ActiveSpan, Context)
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let span = tracer.start_with_context(operation.to_string(), cx);
    let cx = cx.with_span(span);
    (ActiveSpan::new(cx.clone()), cx)
}

fn start_with_options<T>(tracer: &T, operation: &str, options: SpanOptions) -> ActiveSpan
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let mut builder = tracer
        .span_builder(operation.to_string())
        .with_attributes(options.attributes);
    if let Some(kind) = options.kind {
        builder = builder.with_kind(kind);
    }
    if let Some(start_time) = options.start_time {
        builder = builder.with_start_time(start_time);
    }

    let parent = options.parent.unwrap_or_default();
    let span = builder.start_with_context(tracer, &parent);
    ActiveSpan::new(parent.with_span(span))
}

/// Client backed by an OpenTelemetry SDK tracer provider
///
/// The provider stays bound to this client; it only becomes the process-wide
/// provider through [`install_global`](Self::install_global).
#[derive(Debug)]
pub struct TracingClient {
    provider: TracerProvider,
    tracer: SdkTracer,
}

impl TracingClient {
    /// Report spans to a Zipkin collector
    ///
    /// Spans are batched and posted from a background task, so this must be
    /// called inside a Tokio runtime; outside one it fails with
    /// [`TracingError::NoRuntime`].
    pub fn zipkin(config: &ZipkinConfig) -> Result<Self> {
        let provider = zipkin::provider(config)?;
        let client = Self::from_provider(provider);

        if config.install_global {
            client.install_global();
        }
        Ok(client)
    }

    /// Wrap an already configured provider
    pub fn from_provider(provider: TracerProvider) -> Self {
        let tracer = provider.tracer(TRACER_NAME);
        Self { provider, tracer }
    }

    /// Install this client's provider as the process-wide provider
    ///
    /// Replaces whatever provider was installed before.
    pub fn install_global(&self) {
        global::set_tracer_provider(self.provider.clone());
        tracing::debug!("Installed global tracer provider");
    }

    /// Underlying SDK provider
    pub fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Export all finished spans now
    pub fn force_flush(&self) -> Result<()> {
        self.provider
            .force_flush()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(|_| ())
            .map_err(TracingError::Shutdown)
    }

    /// Flush and stop the reporter
    ///
    /// Blocks until pending spans are exported; call it from a blocking
    /// context, not from inside an async task.
    pub fn shutdown(&self) -> Result<()> {
        self.provider.shutdown().map_err(TracingError::Shutdown)
    }
}

impl Client for TracingClient {
    fn start_span_from_context(&self, cx: &Context, operation: &str) -> (ActiveSpan, Context) {
        start_child(&self.tracer, cx, operation)
    }

    fn start_span(&self, operation: &str, options: SpanOptions) -> ActiveSpan {
        start_with_options(&self.tracer, operation, options)
    }
}

/// Client whose spans record nothing
///
/// Parent span contexts still propagate, so code that reads trace ids keeps
/// working with tracing disabled.
#[derive(Debug, Clone, Default)]
pub struct NoopClient {
    tracer: NoopTracer,
}

impl NoopClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Client for NoopClient {
    fn start_span_from_context(&self, cx: &Context, operation: &str) -> (ActiveSpan, Context) {
        start_child(&self.tracer, cx, operation)
    }

    fn start_span(&self, operation: &str, options: SpanOptions) -> ActiveSpan {
        start_with_options(&self.tracer, operation, options)
    }
}

/// Build a Zipkin client and install it as the process-wide provider
///
/// `collector_uri` is the collector base URI; spans are posted to
/// `<collector_uri>/api/v2/spans`. Like [`TracingClient::zipkin`] it must be
/// called inside a Tokio runtime. Errors mean the service cannot report its
/// spans and should stop.
pub fn new_open_tracing_client(
    collector_uri: &str,
    service_name: &str,
    service_uri: &str,
) -> Result<TracingClient> {
    TracingClient::zipkin(&ZipkinConfig::new(collector_uri, service_name, service_uri))
}
