//! Beacon - observability facades for services
//!
//! Wires the metrics facade ([`beacon_metrics`]) and the tracing facade
//! ([`beacon_tracing`]) from a single [`TelemetryConfig`], and sets up the
//! process log subscriber. The two facades are independent; use either
//! crate directly when only one is needed.

pub mod config;
pub mod logging;
pub mod telemetry;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use telemetry::Telemetry;

pub use beacon_metrics as metrics;
pub use beacon_tracing as trace;

pub use beacon_metrics::{Metrics, SharedMetrics};
pub use beacon_tracing::{ActiveSpan, Client, Context, SpanOptions};
