//! Beacon Tracing - span creation behind one contract
//!
//! [`Client`] starts spans either from an ambient [`Context`] or as new
//! roots. [`TracingClient`] reports to a Zipkin collector through the
//! OpenTelemetry SDK; [`NoopClient`] records nothing.
//!
//! ```rust,ignore
//! let client = new_open_tracing_client("http://zipkin:9411", "checkout", "10.0.0.5:8080")?;
//! let (span, cx) = client.start_span_from_context(&Context::current(), "charge_card");
//! // ... pass `cx` to downstream calls ...
//! span.end();
//! ```

pub mod client;
pub mod error;
pub mod span;
pub mod zipkin;

pub use client::{new_open_tracing_client, Client, NoopClient, TracingClient};
pub use error::{Result, TracingError};
pub use span::{ActiveSpan, SpanOptions};
pub use zipkin::ZipkinConfig;

pub use opentelemetry::trace::{SpanKind, Status};
pub use opentelemetry::{Context, KeyValue};
