//! Metric name normalization and tag parsing
//!
//! Callers identify metrics by dotted names (`http.request.duration`) and
//! attach tags shaped like `key:value`. Prometheus needs underscore names
//! with a unit suffix and label pairs, which is what this module produces.

use std::collections::BTreeMap;

/// Kind of metric being emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Duration observation, exported in seconds
    Timing,
    /// Monotonic counter
    Counter,
}

impl MetricKind {
    /// Suffix appended to the normalized name
    pub fn suffix(&self) -> &'static str {
        match self {
            MetricKind::Timing => "_seconds",
            MetricKind::Counter => "_total",
        }
    }
}

/// Replace `.` with `_` and append the suffix for `kind`
pub fn normalize(name: &str, kind: MetricKind) -> String {
    let mut normalized = name.replace('.', "_");
    normalized.push_str(kind.suffix());
    normalized
}

/// A single `key:value` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    pub key: String,
    pub value: &'a str,
}

impl<'a> Tag<'a> {
    /// Split on the first `:`. A tag without one is a key with an empty value.
    ///
    /// The key is turned into a valid label name with [`label_name`].
    pub fn parse(raw: &'a str) -> Self {
        let (key, value) = raw.split_once(':').unwrap_or((raw, ""));
        Self {
            key: label_name(key),
            value,
        }
    }
}

/// Prefix for keys that cannot start a label name as written
const LABEL_PREFIX: &str = "tag_";

/// Make a tag key usable as a Prometheus label name
///
/// Characters outside `[a-zA-Z0-9_]` become `_`. Keys that are empty, start
/// with a digit, use the reserved `__` prefix or equal the histogram bucket
/// label `le` are prefixed with `tag_`.
pub fn label_name(key: &str) -> String {
    let mut name: String = key
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let needs_prefix = name.is_empty()
        || name.starts_with(|c: char| c.is_ascii_digit())
        || name.starts_with("__")
        || name == "le";
    if needs_prefix {
        name.insert_str(0, LABEL_PREFIX);
    }
    name
}

/// Tags ordered by key
///
/// A key given more than once keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet<'a> {
    tags: BTreeMap<String, &'a str>,
}

impl<'a> TagSet<'a> {
    /// Parse a list of raw tags
    pub fn parse(raw: &[&'a str]) -> Self {
        let tags = raw
            .iter()
            .copied()
            .map(Tag::parse)
            .map(|t| (t.key, t.value))
            .collect();
        Self { tags }
    }

    /// Label keys in stable order
    pub fn keys(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    /// Label values, ordered like [`keys`](Self::keys)
    pub fn values(&self) -> Vec<&'a str> {
        self.tags.values().copied().collect()
    }

    /// No tags given
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.tags.len()
    }
}
