//! Common test utilities and fixtures.

#![allow(dead_code)]

use alerty::{ConfigBuilder, ServiceConfig};
use opentelemetry_proto::tonic::{
    collector::trace::v1::ExportTraceServiceRequest,
    common::v1::{any_value::Value, KeyValue},
    resource::v1::Resource,
    trace::v1::Span,
};
use parking_lot::{Mutex, MutexGuard};
use prost::Message;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static SERIAL: Mutex<()> = parking_lot::const_mutex(());

/// Alerty keeps one session per process; tests touching it run one at a time.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock()
}

/// OTLP/HTTP collector double backed by wiremock.
pub struct TestCollector {
    runtime: Runtime,
    server: MockServer,
}

impl TestCollector {
    /// Collector answering every trace export with `status`.
    pub fn start_with_status(status: u16) -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/traces"))
                .and(header("content-type", "application/x-protobuf"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
            server
        });
        Self { runtime, server }
    }

    pub fn start() -> Self {
        Self::start_with_status(200)
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Paths of every request received, matched or not.
    pub fn paths(&self) -> Vec<String> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .into_iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }

    /// Decoded export requests received on the traces endpoint.
    pub fn requests(&self) -> Vec<ExportTraceServiceRequest> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == "/v1/traces")
            .map(|request| ExportTraceServiceRequest::decode(request.body.as_slice()).unwrap())
            .collect()
    }

    /// Every span received, paired with its resource.
    pub fn spans(&self) -> Vec<(Resource, Span)> {
        self.requests()
            .into_iter()
            .flat_map(|request| request.resource_spans)
            .flat_map(|resource_spans| {
                let resource = resource_spans.resource.unwrap_or_default();
                resource_spans
                    .scope_spans
                    .into_iter()
                    .flat_map(|scope| scope.spans)
                    .map(move |span| (resource.clone(), span))
            })
            .collect()
    }

    /// Poll until at least `count` spans arrived or `timeout` elapsed.
    pub fn wait_for_spans(&self, count: usize, timeout: Duration) -> Vec<(Resource, Span)> {
        let deadline = Instant::now() + timeout;
        loop {
            let spans = self.spans();
            if spans.len() >= count || Instant::now() >= deadline {
                return spans;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

/// Configuration pointing at `url` with a complete identity.
pub fn test_config(url: &str) -> ServiceConfig {
    ConfigBuilder::new()
        .organization_id("org_test")
        .name("integration")
        .version("0.1.0")
        .environment("ci")
        .ingest_url(url)
        .scheduled_delay(Duration::from_millis(50))
        .shutdown_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn string_attr<'a>(attrs: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attrs.iter().find(|kv| kv.key == key).and_then(|kv| {
        match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(Value::StringValue(s)) => Some(s.as_str()),
            _ => None,
        }
    })
}

/// Message of the span's `exception` event.
pub fn exception_message(span: &Span) -> Option<&str> {
    span.events
        .iter()
        .find(|event| event.name == "exception")
        .and_then(|event| string_attr(&event.attributes, "exception.message"))
}

/// Stack trace of the span's `exception` event.
pub fn exception_stacktrace(span: &Span) -> Option<&str> {
    span.events
        .iter()
        .find(|event| event.name == "exception")
        .and_then(|event| string_attr(&event.attributes, "exception.stacktrace"))
}
