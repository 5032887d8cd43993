//! Beacon Metrics - counter and timing emission behind one contract
//!
//! Call sites emit through [`Metrics`] and never learn which backend is
//! behind it:
//! - [`NullMetrics`] discards everything (tests, disabled observability)
//! - [`StatsdMetrics`] forwards to a StatsD agent with service/env tags
//! - [`PrometheusMetrics`] creates histograms and counters on demand
//!
//! Emission is fire-and-forget. Backend failures are logged and swallowed.

pub mod config;
pub mod error;
pub mod naming;
pub mod null;
pub mod prom;
pub mod statsd;

use std::sync::Arc;
use std::time::Duration;

pub use config::MetricsConfig;
pub use error::{MetricsError, Result};
pub use naming::{normalize, MetricKind, Tag, TagSet};
pub use null::NullMetrics;
pub use prom::{default_buckets, PrometheusConfig, PrometheusMetrics, PrometheusMetricsBuilder};
pub use statsd::{StatsdConfig, StatsdMetrics};

/// Metrics trait
pub trait Metrics: Send + Sync {
    /// Record an observation of `duration` against a timing metric
    fn timing(&self, name: &str, duration: Duration, tags: &[&str]);

    /// Add 1 to a counter metric
    fn increment(&self, name: &str, tags: &[&str]);
}

/// Shared handle to any backend
pub type SharedMetrics = Arc<dyn Metrics>;

impl<M: Metrics + ?Sized> Metrics for Arc<M> {
    fn timing(&self, name: &str, duration: Duration, tags: &[&str]) {
        (**self).timing(name, duration, tags)
    }

    fn increment(&self, name: &str, tags: &[&str]) {
        (**self).increment(name, tags)
    }
}

impl<M: Metrics + ?Sized> Metrics for Box<M> {
    fn timing(&self, name: &str, duration: Duration, tags: &[&str]) {
        (**self).timing(name, duration, tags)
    }

    fn increment(&self, name: &str, tags: &[&str]) {
        (**self).increment(name, tags)
    }
}

/// StatsD metrics tagged with `service:<service_name>` and `env:<environment>`
///
/// Falls back to [`NullMetrics`] when the client cannot be created, so the
/// returned handle is always usable. Use [`StatsdMetrics::new`] to see the
/// error instead.
pub fn new_statsd_metrics(service_name: &str, environment: &str, uri: &str) -> SharedMetrics {
    match StatsdMetrics::new(service_name, environment, uri) {
        Ok(metrics) => Arc::new(metrics),
        Err(err) => {
            tracing::warn!(uri, error = %err, "StatsD unavailable, metrics disabled");
            Arc::new(NullMetrics)
        }
    }
}

/// Prometheus metrics on the process-wide default registry
pub fn new_prometheus_metrics() -> SharedMetrics {
    Arc::new(PrometheusMetrics::new())
}
