//! Recording a [`ReportableEvent`] as a failed span.
//!
//! Each event becomes a root span that is opened, given an `exception`
//! event and an error status, and ended in one call. Ending hands the span
//! to the provider's processors; nothing leaves this module unclosed.

use crate::core::attributes;
use crate::core::ReportableEvent;
use opentelemetry::trace::{Span, SpanKind, Status, Tracer};
use opentelemetry::{Context, KeyValue};
use std::panic::{self, AssertUnwindSafe};

/// Records events through a tracer of the active pipeline.
pub struct SpanRecorder<'a, T> {
    tracer: &'a T,
}

impl<'a, T: Tracer> SpanRecorder<'a, T> {
    /// Recorder over `tracer`
    pub fn new(tracer: &'a T) -> Self {
        Self { tracer }
    }

    /// Record a failed span for `event`.
    ///
    /// Returns false if recording failed; the failure is logged and
    /// contained.
    pub fn record(&self, event: &ReportableEvent) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| record_span(self.tracer, event)));

        match outcome {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(kind = ?event.kind, "Failed to record span, event discarded");
                false
            },
        }
    }
}

/// Open, populate, fail and end a root span for `event`.
pub fn record_span<T: Tracer>(tracer: &T, event: &ReportableEvent) {
    let mut span = tracer
        .span_builder(event.kind.span_name())
        .with_kind(SpanKind::Internal)
        .with_attributes(vec![KeyValue::new(
            attributes::STACK_ORIGIN,
            event.stack_origin.as_str(),
        )])
        .start_with_context(tracer, &Context::new());

    span.add_event(attributes::EXCEPTION_EVENT_NAME, exception_attributes(event));
    span.set_status(Status::error(event.message.clone()));
    span.end();
}

fn exception_attributes(event: &ReportableEvent) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new(attributes::EXCEPTION_MESSAGE, event.message.clone())];
    if let Some(error_type) = &event.error_type {
        attrs.push(KeyValue::new(attributes::EXCEPTION_TYPE, error_type.clone()));
    }
    if let Some(stack) = event.render_stack() {
        attrs.push(KeyValue::new(attributes::EXCEPTION_STACKTRACE, stack));
    }
    attrs
}
