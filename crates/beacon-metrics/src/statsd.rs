//! StatsD backend
//!
//! Forwards emissions to a [`cadence`] client. Every metric carries the
//! default tags `service:<name>` and `env:<environment>`; per-call tags are
//! appended as `key:value` pairs (DogStatsD tag syntax).

use crate::error::Result;
use crate::Metrics;
use cadence::prelude::*;
use cadence::{
    BufferedUdpMetricSink, MetricSink, QueuingMetricSink, StatsdClient, UdpMetricSink,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::UdpSocket;
use std::panic::RefUnwindSafe;
use std::time::Duration;

/// StatsD sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsdConfig {
    /// Agent address, `host:port` (an optional `udp://` prefix is accepted)
    pub uri: String,

    /// Pack several metrics into one datagram before sending
    #[serde(default = "default_buffered")]
    pub buffered: bool,

    /// Hand metrics to a background thread with this queue size.
    /// `None` sends on the calling thread.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: Option<usize>,

    /// Prefix prepended to every metric name
    #[serde(default)]
    pub prefix: String,
}

fn default_buffered() -> bool {
    true
}

fn default_queue_capacity() -> Option<usize> {
    Some(1024)
}

impl StatsdConfig {
    /// Create a config with default buffering and queueing
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            buffered: default_buffered(),
            queue_capacity: default_queue_capacity(),
            prefix: String::new(),
        }
    }

    /// Enable/disable datagram buffering
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Set the background queue capacity, or `None` to send inline
    pub fn with_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the metric name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn address(&self) -> &str {
        self.uri.strip_prefix("udp://").unwrap_or(&self.uri)
    }
}

/// Metrics backed by a StatsD agent
pub struct StatsdMetrics {
    client: StatsdClient,
    default_tags: Vec<String>,
}

impl StatsdMetrics {
    /// Connect to the agent at `uri` with default buffering and queueing
    pub fn new(service_name: &str, environment: &str, uri: &str) -> Result<Self> {
        Self::from_config(service_name, environment, &StatsdConfig::new(uri))
    }

    /// Connect using an explicit sink configuration
    pub fn from_config(service_name: &str, environment: &str, config: &StatsdConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let default_tags = [("service", service_name), ("env", environment)];
        let address = config.address();

        let client = match (config.buffered, config.queue_capacity) {
            (true, Some(capacity)) => {
                let sink = BufferedUdpMetricSink::from(address, socket)?;
                build_client(
                    &config.prefix,
                    QueuingMetricSink::with_capacity(sink, capacity),
                    &default_tags,
                )
            }
            (true, None) => build_client(
                &config.prefix,
                BufferedUdpMetricSink::from(address, socket)?,
                &default_tags,
            ),
            (false, Some(capacity)) => {
                let sink = UdpMetricSink::from(address, socket)?;
                build_client(
                    &config.prefix,
                    QueuingMetricSink::with_capacity(sink, capacity),
                    &default_tags,
                )
            }
            (false, None) => build_client(
                &config.prefix,
                UdpMetricSink::from(address, socket)?,
                &default_tags,
            ),
        };

        tracing::debug!(
            uri = %config.uri,
            service = service_name,
            env = environment,
            buffered = config.buffered,
            "StatsD metrics initialized"
        );

        Ok(Self {
            client,
            default_tags: default_tags
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value))
                .collect(),
        })
    }

    /// Tags attached to every emission
    pub fn default_tags(&self) -> &[String] {
        &self.default_tags
    }

    /// Flush buffered metrics to the agent
    pub fn flush(&self) {
        if let Err(err) = self.client.flush() {
            tracing::debug!(error = %err, "StatsD flush failed");
        }
    }
}

fn build_client<T>(prefix: &str, sink: T, default_tags: &[(&str, &str)]) -> StatsdClient
where
    T: MetricSink + Sync + Send + RefUnwindSafe + 'static,
{
    default_tags
        .iter()
        .fold(StatsdClient::builder(prefix, sink), |builder, (key, value)| {
            builder.with_tag(*key, *value)
        })
        .build()
}

impl fmt::Debug for StatsdMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdMetrics")
            .field("default_tags", &self.default_tags)
            .finish_non_exhaustive()
    }
}

impl Metrics for StatsdMetrics {
    fn timing(&self, name: &str, duration: Duration, tags: &[&str]) {
        let mut builder = self.client.time_with_tags(name, duration);
        for tag in tags {
            builder = match tag.split_once(':') {
                Some((key, value)) => builder.with_tag(key, value),
                None => builder.with_tag_value(tag),
            };
        }

        if let Err(err) = builder.try_send() {
            tracing::debug!(metric = name, error = %err, "StatsD timing dropped");
        }
    }

    fn increment(&self, name: &str, tags: &[&str]) {
        let mut builder = self.client.incr_with_tags(name);
        for tag in tags {
            builder = match tag.split_once(':') {
                Some((key, value)) => builder.with_tag(key, value),
                None => builder.with_tag_value(tag),
            };
        }

        if let Err(err) = builder.try_send() {
            tracing::debug!(metric = name, error = %err, "StatsD counter dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    fn receive(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 1024];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    fn inline_config(uri: &str) -> StatsdConfig {
        StatsdConfig::new(uri)
            .with_buffered(false)
            .with_queue_capacity(None)
    }

    #[test]
    fn test_default_tags() {
        let (_agent, addr) = agent();
        let metrics = StatsdMetrics::new("svc", "prod", &addr).unwrap();

        assert_eq!(metrics.default_tags(), ["service:svc", "env:prod"]);
    }

    #[test]
    fn test_config_defaults() {
        let config = StatsdConfig::new("udp://127.0.0.1:8125");

        assert!(config.buffered);
        assert_eq!(config.queue_capacity, Some(1024));
        assert_eq!(config.address(), "127.0.0.1:8125");
    }

    #[test]
    fn test_invalid_uri_is_an_error() {
        let result = StatsdMetrics::new("svc", "prod", "not-a-socket-address");
        assert!(result.is_err());
    }

    #[test]
    fn test_timing_datagram() {
        let (agent, addr) = agent();
        let metrics = StatsdMetrics::from_config("svc", "prod", &inline_config(&addr)).unwrap();

        metrics.timing("request.latency", Duration::from_millis(5), &["route:home"]);

        let packet = receive(&agent);
        assert!(packet.starts_with("request.latency:5|ms"), "{}", packet);
        assert!(packet.contains("route:home"));
        assert!(packet.contains("service:svc"));
        assert!(packet.contains("env:prod"));
    }

    #[test]
    fn test_increment_datagram() {
        let (agent, addr) = agent();
        let metrics = StatsdMetrics::from_config("svc", "prod", &inline_config(&addr)).unwrap();

        metrics.increment("cache.miss", &["canary"]);

        let packet = receive(&agent);
        assert!(packet.starts_with("cache.miss:1|c"), "{}", packet);
        assert!(packet.contains("canary"));
        assert!(packet.contains("service:svc"));
    }

    #[test]
    fn test_prefix() {
        let (agent, addr) = agent();
        let config = inline_config(&addr).with_prefix("edge");
        let metrics = StatsdMetrics::from_config("svc", "prod", &config).unwrap();

        metrics.increment("hits", &[]);

        assert!(receive(&agent).starts_with("edge.hits:1|c"));
    }

    #[test]
    fn test_emission_without_listener_does_not_panic() {
        // Nothing listens on port 9; sends either succeed or are swallowed.
        let metrics = StatsdMetrics::new("svc", "prod", "127.0.0.1:9").unwrap();

        for _ in 0..100 {
            metrics.timing("t", Duration::from_millis(1), &[]);
            metrics.increment("c", &["k:v"]);
        }
        metrics.flush();
    }
}
