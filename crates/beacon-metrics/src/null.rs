//! No-op metrics sink

use crate::Metrics;
use std::time::Duration;

/// Metrics implementation that discards every emission
///
/// Used in tests and when observability is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetrics;

impl Metrics for NullMetrics {
    fn timing(&self, _name: &str, _duration: Duration, _tags: &[&str]) {}

    fn increment(&self, _name: &str, _tags: &[&str]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharedMetrics;
    use std::sync::Arc;

    #[test]
    fn test_null_metrics_accepts_everything() {
        let metrics = NullMetrics;

        for _ in 0..1000 {
            metrics.increment("x", &[]);
        }
        metrics.timing("x", Duration::from_secs(3600), &["anything:goes", "bare"]);
    }

    #[test]
    fn test_null_metrics_as_shared() {
        let metrics: SharedMetrics = Arc::new(NullMetrics);
        metrics.increment("requests", &["route:home"]);
    }
}
