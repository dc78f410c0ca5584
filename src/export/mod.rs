//! Span export.
//!
//! Every exporter runs behind its own SDK batch processor on a dedicated
//! background thread, so recording a span never waits on I/O. The session
//! wires one processor to the OTLP/HTTP collector and, in debug mode, a
//! second one to the local debug sink.

use crate::core::BatchConfig;
use futures::future::BoxFuture;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData};
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor};
use opentelemetry_sdk::Resource;

pub mod debug;
pub mod memory;
pub mod otlp;

pub use debug::DebugExporter;
pub use memory::InMemoryExporter;
pub use opentelemetry_sdk::export::trace::SpanExporter;
pub use otlp::otlp_exporter;

/// Wrap `exporter` in a batch processor tuned by `config`.
pub fn batch_processor<E>(exporter: E, config: &BatchConfig) -> BatchSpanProcessor<TokioCurrentThread>
where
    E: SpanExporter + 'static,
{
    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(config.max_queue_size)
        .with_max_export_batch_size(config.max_export_batch_size)
        .with_scheduled_delay(config.scheduled_delay)
        .with_max_export_timeout(config.export_timeout)
        .build();

    BatchSpanProcessor::builder(exporter, TokioCurrentThread)
        .with_batch_config(batch_config)
        .build()
}

/// Boxed exporter supplied by the host.
#[derive(Debug)]
pub(crate) struct HostExporter(pub(crate) Box<dyn SpanExporter>);

impl SpanExporter for HostExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.0.export(batch)
    }

    fn shutdown(&mut self) {
        self.0.shutdown();
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        self.0.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.0.set_resource(resource);
    }
}
