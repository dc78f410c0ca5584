//! Local debug mirror.
//!
//! Writes every exported span as pretty-printed JSON, to stderr by default
//! or to a file when one is configured.

use crate::core::{AlertyError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use opentelemetry::trace::{Status, TraceError};
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Writes spans in a human-readable form.
pub struct DebugExporter {
    writer: Box<dyn Write + Send + Sync>,
    resource: Resource,
}

impl fmt::Debug for DebugExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugExporter").finish_non_exhaustive()
    }
}

impl DebugExporter {
    /// Mirror spans to stderr
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// Mirror spans to a file, appending if it exists
    pub fn file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AlertyError::debug_sink_init(format!("cannot open {}: {}", path.display(), e))
            })?;
        Ok(Self::new(Box::new(file)))
    }

    /// Mirror spans to an arbitrary writer
    pub fn new(writer: Box<dyn Write + Send + Sync>) -> Self {
        Self {
            writer,
            resource: Resource::empty(),
        }
    }

    fn write_batch(&mut self, batch: &[SpanData]) -> Result<()> {
        for span in batch {
            serde_json::to_writer_pretty(&mut self.writer, &span_to_json(span, &self.resource))?;
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl SpanExporter for DebugExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .write_batch(&batch)
            .map_err(|e| TraceError::from(format!("debug mirror write failed: {}", e)));
        Box::pin(std::future::ready(result))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}

fn attributes_json<'a>(kvs: impl Iterator<Item = (&'a str, String)>) -> JsonValue {
    kvs.map(|(key, value)| (key.to_string(), JsonValue::String(value)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn key_values(kvs: &[KeyValue]) -> JsonValue {
    attributes_json(kvs.iter().map(|kv| (kv.key.as_str(), kv.value.to_string())))
}

/// JSON rendering of a span used by the debug mirror.
pub fn span_to_json(span: &SpanData, resource: &Resource) -> JsonValue {
    let events: Vec<JsonValue> = span
        .events
        .iter()
        .map(|event| {
            json!({
                "name": event.name,
                "timestamp": DateTime::<Utc>::from(event.timestamp).to_rfc3339(),
                "attributes": key_values(&event.attributes),
            })
        })
        .collect();

    let status = match &span.status {
        Status::Error { description } => json!({ "code": "Error", "description": description }),
        Status::Ok => json!({ "code": "Ok" }),
        Status::Unset => json!({ "code": "Unset" }),
    };

    json!({
        "name": span.name,
        "traceId": hex::encode(span.span_context.trace_id().to_bytes()),
        "spanId": hex::encode(span.span_context.span_id().to_bytes()),
        "startTime": DateTime::<Utc>::from(span.start_time).to_rfc3339(),
        "endTime": DateTime::<Utc>::from(span.end_time).to_rfc3339(),
        "status": status,
        "attributes": key_values(&span.attributes),
        "events": events,
        "resource": attributes_json(resource.iter().map(|(key, value)| (key.as_str(), value.to_string()))),
    })
}
