//! Zipkin reporter setup

use crate::error::{Result, TracingError};
use opentelemetry::KeyValue;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};

/// Path the Zipkin v2 JSON API accepts spans on
pub const SPANS_PATH: &str = "/api/v2/spans";

/// Zipkin reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipkinConfig {
    /// Collector base URI, e.g. `http://zipkin:9411`
    pub collector_uri: String,

    /// Local service name
    pub service_name: String,

    /// Local service address, `host[:port]`; empty for none
    #[serde(default)]
    pub service_uri: String,

    /// Install as the process-wide tracer provider
    #[serde(default = "default_install_global")]
    pub install_global: bool,
}

fn default_install_global() -> bool {
    true
}

impl ZipkinConfig {
    pub fn new(
        collector_uri: impl Into<String>,
        service_name: impl Into<String>,
        service_uri: impl Into<String>,
    ) -> Self {
        Self {
            collector_uri: collector_uri.into(),
            service_name: service_name.into(),
            service_uri: service_uri.into(),
            install_global: default_install_global(),
        }
    }

    /// Keep the provider local to the client
    pub fn without_global(mut self) -> Self {
        self.install_global = false;
        self
    }

    /// Full URL spans are posted to
    pub fn spans_endpoint(&self) -> String {
        format!("{}{}", self.collector_uri.trim_end_matches('/'), SPANS_PATH)
    }
}

/// Resolve the local endpoint address
///
/// Accepts `host[:port]` with an optional `scheme://` prefix and path suffix.
/// A missing port is reported as port 0. An empty address means the endpoint
/// carries only the service name.
pub fn service_address(service_uri: &str) -> Result<Option<SocketAddr>> {
    let invalid = |reason: String| TracingError::InvalidServiceAddress {
        address: service_uri.to_string(),
        reason,
    };

    let authority = service_uri
        .split_once("://")
        .map_or(service_uri, |(_, rest)| rest);
    let authority = authority.split('/').next().unwrap_or_default().trim();
    if authority.is_empty() {
        return Ok(None);
    }

    let (host, port) = split_host_port(authority);
    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .map_err(|e| invalid(format!("invalid port '{}': {}", port, e)))?,
        None => 0,
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .map(Some)
        .ok_or_else(|| invalid("no addresses resolved".to_string()))
}

/// Split `host:port`, `[v6]:port`, a bare host or a bare IPv6 address
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (authority, None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (authority, None),
    }
}

/// Build a provider that batches spans to the collector
pub(crate) fn provider(config: &ZipkinConfig) -> Result<TracerProvider> {
    if config.service_name.trim().is_empty() {
        return Err(TracingError::MissingServiceName);
    }
    let address = service_address(&config.service_uri)?;
    let endpoint = config.spans_endpoint();

    // The batch processor spawns its export task on the current runtime.
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(TracingError::NoRuntime);
    }

    let mut pipeline = opentelemetry_zipkin::new_pipeline()
        .with_service_name(config.service_name.clone())
        .with_collector_endpoint(endpoint.clone());
    if let Some(address) = address {
        pipeline = pipeline.with_service_address(address);
    }
    let exporter = pipeline.init_exporter().map_err(TracingError::Exporter)?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            SERVICE_NAME,
            config.service_name.clone(),
        )]))
        .build();

    tracing::info!(
        collector = %endpoint,
        service = %config.service_name,
        address = ?address,
        "Zipkin reporter initialized"
    );

    Ok(provider)
}
