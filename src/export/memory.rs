//! In-memory exporter for tests and local inspection.
//!
//! Clones share one store, so a host keeps a handle while the session owns
//! the exporter. Unlike the SDK's testing exporter, spans survive shutdown
//! and can be inspected after the session stopped.

use crate::core::attributes;
use futures::future::BoxFuture;
use opentelemetry::trace::Status;
use opentelemetry::Key;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Keeps every exported span in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    spans: Mutex<Vec<SpanData>>,
    resource: Mutex<Option<Resource>>,
    exports: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl InMemoryExporter {
    /// Create an empty exporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the spans received so far
    pub fn spans(&self) -> Vec<SpanData> {
        self.inner.spans.lock().clone()
    }

    /// Number of spans received
    pub fn len(&self) -> usize {
        self.inner.spans.lock().len()
    }

    /// Returns true if no span was received
    pub fn is_empty(&self) -> bool {
        self.inner.spans.lock().is_empty()
    }

    /// Remove and return all spans
    pub fn take(&self) -> Vec<SpanData> {
        std::mem::take(&mut *self.inner.spans.lock())
    }

    /// Resource the exporting pipeline was configured with
    pub fn resource(&self) -> Option<Resource> {
        self.inner.resource.lock().clone()
    }

    /// String value of a resource attribute
    pub fn resource_attribute(&self, key: &'static str) -> Option<String> {
        self.inner
            .resource
            .lock()
            .as_ref()
            .and_then(|resource| resource.get(Key::from_static_str(key)))
            .map(|value| value.as_str().into_owned())
    }

    /// Messages of the recorded exceptions, in export order
    pub fn exception_messages(&self) -> Vec<String> {
        self.inner.spans.lock().iter().filter_map(exception_message).collect()
    }

    /// Number of export calls received
    pub fn export_count(&self) -> usize {
        self.inner.exports.load(Ordering::Relaxed)
    }

    /// Number of shutdown calls received
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdowns.load(Ordering::Relaxed)
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.inner.exports.fetch_add(1, Ordering::Relaxed);
        self.inner.spans.lock().extend(batch);
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&mut self) {
        self.inner.shutdowns.fetch_add(1, Ordering::Relaxed);
    }

    fn set_resource(&mut self, resource: &Resource) {
        *self.inner.resource.lock() = Some(resource.clone());
    }
}

/// Look up a string attribute of the span's `exception` event.
pub fn exception_attribute(span: &SpanData, key: &str) -> Option<String> {
    span.events
        .iter()
        .find(|event| event.name == attributes::EXCEPTION_EVENT_NAME)
        .and_then(|event| event.attributes.iter().find(|kv| kv.key.as_str() == key))
        .map(|kv| kv.value.as_str().into_owned())
}

/// Message of the span's recorded exception
pub fn exception_message(span: &SpanData) -> Option<String> {
    exception_attribute(span, attributes::EXCEPTION_MESSAGE)
}

/// Returns true if the span status marks a failure
pub fn is_failed(span: &SpanData) -> bool {
    matches!(span.status, Status::Error { .. })
}
