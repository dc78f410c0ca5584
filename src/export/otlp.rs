//! OTLP/HTTP exporter.
//!
//! Spans are posted as protobuf to the resolved ingest URL. The URL is
//! handed to the exporter verbatim; `/v1/traces` completion happens in
//! [`ServiceConfig::resolve_ingest_url`](crate::ServiceConfig::resolve_ingest_url).

use crate::core::{AlertyError, Result};
use opentelemetry_otlp::{Protocol, WithExportConfig};
use reqwest::Url;
use std::time::Duration;

/// Build the exporter posting to `endpoint`, giving up on a request after
/// `timeout`.
pub fn otlp_exporter(endpoint: &Url, timeout: Duration) -> Result<opentelemetry_otlp::SpanExporter> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AlertyError::transport_init(format!("failed to build HTTP client: {}", e)))?;

    opentelemetry_otlp::new_exporter()
        .http()
        .with_http_client(client)
        .with_endpoint(endpoint.as_str())
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(timeout)
        .build_span_exporter()
        .map_err(|e| AlertyError::transport_init(format!("failed to build OTLP exporter: {}", e)))
}
