//! Prometheus backend
//!
//! Instruments are created on first reference from the dotted name supplied
//! at call time and live for the lifetime of the backend. Each normalized
//! name maps to exactly one instrument family; its label keys are fixed by
//! the tags of the first emission.

use crate::error::{MetricsError, Result};
use crate::naming::{normalize, MetricKind, TagSet};
use crate::Metrics;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Lower bound of the first default bucket (1µs, in seconds)
pub const DEFAULT_BUCKET_START: f64 = 1e-6;

/// Growth factor between default buckets
pub const DEFAULT_BUCKET_FACTOR: f64 = 10.0;

/// Number of default buckets
pub const DEFAULT_BUCKET_COUNT: usize = 7;

/// Default histogram buckets: 1µs to 1s, one per decade
pub fn default_buckets() -> Vec<f64> {
    std::iter::successors(Some(DEFAULT_BUCKET_START), |bound| {
        Some(bound * DEFAULT_BUCKET_FACTOR)
    })
    .take(DEFAULT_BUCKET_COUNT)
    .collect()
}

/// Prometheus backend configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Buckets for timings without an explicit entry in `buckets`
    #[serde(default)]
    pub default_buckets: Option<Vec<f64>>,

    /// Buckets per dotted timing name
    #[serde(default)]
    pub buckets: HashMap<String, Vec<f64>>,
}

/// Labelled instrument vector
trait InstrumentVec: Collector + Clone + 'static {
    type Child;

    fn child(&self, values: &[&str]) -> prometheus::Result<Self::Child>;
}

impl InstrumentVec for HistogramVec {
    type Child = Histogram;

    fn child(&self, values: &[&str]) -> prometheus::Result<Histogram> {
        self.get_metric_with_label_values(values)
    }
}

impl InstrumentVec for IntCounterVec {
    type Child = IntCounter;

    fn child(&self, values: &[&str]) -> prometheus::Result<IntCounter> {
        self.get_metric_with_label_values(values)
    }
}

/// One instrument family and the label keys it was declared with
struct Family<V> {
    vec: V,
    label_keys: Vec<String>,
}

impl<V: InstrumentVec> Family<V> {
    fn child(&self, name: &str, tags: &TagSet<'_>) -> Result<V::Child> {
        let keys = tags.keys();
        if keys != self.label_keys {
            return Err(MetricsError::LabelMismatch {
                name: name.to_string(),
                expected: self.label_keys.clone(),
                actual: keys,
            });
        }

        let values = tags.values();
        self.vec
            .child(values.as_slice())
            .map_err(|source| MetricsError::Registration {
                name: name.to_string(),
                source,
            })
    }
}

/// Metrics backed by a Prometheus registry
pub struct PrometheusMetrics {
    registry: Registry,
    default_buckets: Vec<f64>,
    buckets: HashMap<String, Vec<f64>>,
    counters: RwLock<HashMap<String, Family<IntCounterVec>>>,
    timers: RwLock<HashMap<String, Family<HistogramVec>>>,
}

impl PrometheusMetrics {
    /// Create a backend registering against the process-wide default registry
    pub fn new() -> Self {
        Self {
            registry: prometheus::default_registry().clone(),
            default_buckets: default_buckets(),
            buckets: HashMap::new(),
            counters: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
        }
    }

    /// Start building a backend with a custom registry or buckets
    pub fn builder() -> PrometheusMetricsBuilder {
        PrometheusMetricsBuilder::default()
    }

    /// Create a backend on the default registry from configuration
    pub fn from_config(config: &PrometheusConfig) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(buckets) = &config.default_buckets {
            builder = builder.default_buckets(buckets.clone());
        }
        for (name, buckets) in &config.buckets {
            builder = builder.buckets_for(name, buckets.clone());
        }
        builder.build()
    }

    /// Registry the instruments are registered with
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Buckets a timing with this dotted name is (or will be) created with
    pub fn buckets(&self, name: &str) -> &[f64] {
        self.buckets
            .get(&normalize(name, MetricKind::Timing))
            .unwrap_or(&self.default_buckets)
    }

    /// Normalized names of all histograms created so far
    pub fn histogram_names(&self) -> Vec<String> {
        read(&self.timers).keys().cloned().collect()
    }

    /// Normalized names of all counters created so far
    pub fn counter_names(&self) -> Vec<String> {
        read(&self.counters).keys().cloned().collect()
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    /// Record a timing, reporting registration and label errors
    pub fn try_timing(&self, name: &str, duration: Duration, tags: &[&str]) -> Result<()> {
        let name = normalize(name, MetricKind::Timing);
        let tags = TagSet::parse(tags);

        let histogram = self.child(&self.timers, &name, &tags, |keys| {
            let opts = HistogramOpts::new(name.as_str(), name.as_str())
                .buckets(self.buckets.get(&name).unwrap_or(&self.default_buckets).clone());
            HistogramVec::new(opts, keys)
        })?;

        histogram.observe(duration.as_secs_f64());
        Ok(())
    }

    /// Increment a counter, reporting registration and label errors
    pub fn try_increment(&self, name: &str, tags: &[&str]) -> Result<()> {
        let name = normalize(name, MetricKind::Counter);
        let tags = TagSet::parse(tags);

        let counter = self.child(&self.counters, &name, &tags, |keys| {
            IntCounterVec::new(Opts::new(name.as_str(), name.as_str()), keys)
        })?;

        counter.inc();
        Ok(())
    }

    /// Look up the family for `name`, creating and registering it on first use
    fn child<V: InstrumentVec>(
        &self,
        families: &RwLock<HashMap<String, Family<V>>>,
        name: &str,
        tags: &TagSet<'_>,
        create: impl FnOnce(&[&str]) -> prometheus::Result<V>,
    ) -> Result<V::Child> {
        if let Some(family) = read(families).get(name) {
            return family.child(name, tags);
        }

        let mut families = write(families);
        // Another thread may have created it between the two locks.
        if let Some(family) = families.get(name) {
            return family.child(name, tags);
        }

        let label_keys = tags.keys();
        let keys: Vec<&str> = label_keys.iter().map(String::as_str).collect();
        let registration_error = |source| MetricsError::Registration {
            name: name.to_string(),
            source,
        };

        let vec = create(keys.as_slice()).map_err(registration_error)?;
        self.registry
            .register(Box::new(vec.clone()))
            .map_err(registration_error)?;

        tracing::debug!(metric = name, labels = ?label_keys, "Registered instrument");

        let family = Family { vec, label_keys };
        let child = family.child(name, tags);
        families.insert(name.to_string(), family);
        child
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("default_buckets", &self.default_buckets)
            .field("histograms", &self.histogram_names())
            .field("counters", &self.counter_names())
            .finish_non_exhaustive()
    }
}

/// Registration conflicts and label mismatches are bugs at the call site.
fn programmer_error(err: MetricsError) -> ! {
    tracing::error!(error = %err, "Invalid metric emission");
    panic!("{}", err)
}

impl Metrics for PrometheusMetrics {
    /// # Panics
    ///
    /// If the instrument conflicts with another collector in the registry, or
    /// the tag keys differ from those of the first emission.
    fn timing(&self, name: &str, duration: Duration, tags: &[&str]) {
        if let Err(err) = self.try_timing(name, duration, tags) {
            programmer_error(err);
        }
    }

    /// # Panics
    ///
    /// Same conditions as [`timing`](Self::timing).
    fn increment(&self, name: &str, tags: &[&str]) {
        if let Err(err) = self.try_increment(name, tags) {
            programmer_error(err);
        }
    }
}

/// Builder for [`PrometheusMetrics`]
#[derive(Default)]
pub struct PrometheusMetricsBuilder {
    registry: Option<Registry>,
    default_buckets: Option<Vec<f64>>,
    buckets: HashMap<String, Vec<f64>>,
}

impl PrometheusMetricsBuilder {
    /// Register instruments with `registry` instead of the default one
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Buckets for timings without a per-name override
    pub fn default_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.default_buckets = Some(buckets);
        self
    }

    /// Buckets for the timing with this dotted name
    pub fn buckets_for(mut self, name: &str, buckets: Vec<f64>) -> Self {
        self.buckets.insert(normalize(name, MetricKind::Timing), buckets);
        self
    }

    pub fn build(self) -> Result<PrometheusMetrics> {
        let default_buckets = match self.default_buckets {
            Some(buckets) => {
                validate_buckets("default", &buckets)?;
                buckets
            }
            None => default_buckets(),
        };
        for (name, buckets) in &self.buckets {
            validate_buckets(name, buckets)?;
        }

        Ok(PrometheusMetrics {
            registry: self
                .registry
                .unwrap_or_else(|| prometheus::default_registry().clone()),
            default_buckets,
            buckets: self.buckets,
            counters: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
        })
    }
}

fn validate_buckets(name: &str, buckets: &[f64]) -> Result<()> {
    let invalid = |reason: &str| MetricsError::InvalidBuckets {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if buckets.is_empty() {
        return Err(invalid("no buckets given"));
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(invalid("bounds must be finite"));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(invalid("bounds must be strictly increasing"));
    }
    Ok(())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn isolated() -> PrometheusMetrics {
        PrometheusMetrics::builder()
            .registry(Registry::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_buckets() {
        let buckets = default_buckets();
        let expected = [1e-6, 1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1.0];

        assert_eq!(buckets.len(), 7);
        for (actual, expected) in buckets.iter().zip(expected) {
            assert!((actual - expected).abs() <= expected * 1e-9, "{} != {}", actual, expected);
        }
        assert_eq!(
            buckets,
            prometheus::exponential_buckets(DEFAULT_BUCKET_START, DEFAULT_BUCKET_FACTOR, DEFAULT_BUCKET_COUNT)
                .unwrap()
        );
    }

    #[test]
    fn test_timing_creates_histogram() {
        let metrics = isolated();

        metrics.timing("http.request.latency", Duration::from_millis(5), &[]);

        assert_eq!(metrics.histogram_names(), vec!["http_request_latency_seconds"]);
        let output = metrics.render().unwrap();
        assert!(output.contains("# TYPE http_request_latency_seconds histogram"));
        assert!(output.contains("http_request_latency_seconds_count 1"));
        assert!(output.contains("http_request_latency_seconds_sum 0.005"));
    }

    #[test]
    fn test_increment_creates_counter() {
        let metrics = isolated();

        for _ in 0..3 {
            metrics.increment("cache.miss", &[]);
        }

        assert_eq!(metrics.counter_names(), vec!["cache_miss_total"]);
        assert!(metrics.render().unwrap().contains("cache_miss_total 3"));
    }

    #[test]
    fn test_same_name_shares_instrument() {
        let metrics = isolated();

        metrics.increment("a.b", &[]);
        metrics.increment("a_b", &[]);

        assert_eq!(metrics.counter_names().len(), 1);
        assert_eq!(metrics.registry().gather().len(), 1);
        assert!(metrics.render().unwrap().contains("a_b_total 2"));
    }

    #[test]
    fn test_timing_and_counter_are_distinct() {
        let metrics = isolated();

        metrics.increment("jobs", &[]);
        metrics.timing("jobs", Duration::from_millis(1), &[]);

        assert_eq!(metrics.registry().gather().len(), 2);
    }

    #[test]
    fn test_tags_become_labels() {
        let metrics = isolated();

        metrics.increment("requests", &["route:home", "method:GET"]);
        metrics.increment("requests", &["method:GET", "route:home"]);
        metrics.increment("requests", &["route:login", "method:POST"]);

        let output = metrics.render().unwrap();
        assert!(output.contains(r#"requests_total{method="GET",route="home"} 2"#), "{}", output);
        assert!(output.contains(r#"requests_total{method="POST",route="login"} 1"#));
    }

    #[test]
    fn test_tag_keys_made_label_safe() {
        let metrics = isolated();

        metrics.increment("requests", &["status-code:200"]);
        metrics.increment("empty", &[":value"]);
        metrics.increment("digits", &["1x:y"]);
        metrics.timing("lookup", Duration::from_millis(2), &["le:x"]);

        let output = metrics.render().unwrap();
        assert!(output.contains(r#"requests_total{status_code="200"} 1"#), "{}", output);
        assert!(output.contains(r#"empty_total{tag_="value"} 1"#), "{}", output);
        assert!(output.contains(r#"digits_total{tag_1x="y"} 1"#), "{}", output);
        assert!(output.contains(r#"lookup_seconds_count{tag_le="x"} 1"#), "{}", output);
    }

    #[test]
    fn test_label_mismatch_is_reported() {
        let metrics = isolated();

        metrics.try_increment("requests", &["route:home"]).unwrap();
        let err = metrics.try_increment("requests", &["status:200"]).unwrap_err();

        match err {
            MetricsError::LabelMismatch { name, expected, actual } => {
                assert_eq!(name, "requests_total");
                assert_eq!(expected, vec!["route"]);
                assert_eq!(actual, vec!["status"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    #[should_panic(expected = "Label mismatch")]
    fn test_label_mismatch_panics_through_trait() {
        let metrics = isolated();

        metrics.timing("latency", Duration::from_millis(1), &["route:home"]);
        metrics.timing("latency", Duration::from_millis(1), &[]);
    }

    #[test]
    fn test_registration_conflict_is_reported() {
        let registry = Registry::new();
        let existing = IntCounter::new("jobs_total", "registered elsewhere").unwrap();
        registry.register(Box::new(existing)).unwrap();
        let metrics = PrometheusMetrics::builder().registry(registry).build().unwrap();

        let err = metrics.try_increment("jobs", &[]).unwrap_err();

        assert!(matches!(err, MetricsError::Registration { .. }));
        assert!(metrics.counter_names().is_empty());
    }

    #[test]
    fn test_custom_buckets() {
        let metrics = PrometheusMetrics::builder()
            .registry(Registry::new())
            .default_buckets(vec![0.1, 1.0])
            .buckets_for("db.query", vec![0.001, 0.01, 0.1])
            .build()
            .unwrap();

        assert_eq!(metrics.buckets("db.query"), [0.001, 0.01, 0.1]);
        assert_eq!(metrics.buckets("http.request"), [0.1, 1.0]);

        metrics.timing("db.query", Duration::from_millis(2), &[]);
        let output = metrics.render().unwrap();
        assert!(output.contains(r#"db_query_seconds_bucket{le="0.01"} 1"#), "{}", output);
    }

    #[test]
    fn test_invalid_buckets_rejected() {
        let empty = PrometheusMetrics::builder().default_buckets(vec![]).build();
        assert!(matches!(empty, Err(MetricsError::InvalidBuckets { .. })));

        let unordered = PrometheusMetrics::builder()
            .buckets_for("x", vec![1.0, 0.5])
            .build();
        assert!(matches!(unordered, Err(MetricsError::InvalidBuckets { .. })));

        let infinite = PrometheusMetrics::builder()
            .buckets_for("x", vec![1.0, f64::INFINITY])
            .build();
        assert!(matches!(infinite, Err(MetricsError::InvalidBuckets { .. })));
    }

    #[test]
    fn test_config_deserialize() {
        let config: PrometheusConfig = serde_json::from_str(
            r#"{"default_buckets": [0.01, 0.1, 1.0], "buckets": {"db.query": [0.001, 0.01]}}"#,
        )
        .unwrap();

        assert_eq!(config.default_buckets, Some(vec![0.01, 0.1, 1.0]));
        assert_eq!(config.buckets["db.query"], vec![0.001, 0.01]);
    }

    #[test]
    fn test_concurrent_first_emission() {
        let metrics = Arc::new(isolated());

        std::thread::scope(|scope| {
            for i in 0..8u64 {
                let metrics = Arc::clone(&metrics);
                scope.spawn(move || {
                    metrics.timing("a.b", Duration::from_millis(i + 1), &[]);
                    metrics.increment("a.b", &[]);
                });
            }
        });

        assert_eq!(metrics.histogram_names(), vec!["a_b_seconds"]);
        assert_eq!(metrics.counter_names(), vec!["a_b_total"]);
        let output = metrics.render().unwrap();
        assert!(output.contains("a_b_seconds_count 8"));
        assert!(output.contains("a_b_total 8"));
    }
}
