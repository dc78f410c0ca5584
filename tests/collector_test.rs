//! End-to-end tests against a local OTLP/HTTP collector.
//!
//! Each test starts a real session whose network exporter posts protobuf
//! batches to a wiremock collector, then decodes what arrived.

use alerty::{Failure, Recover, Session, TracedError};
use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use pretty_assertions::assert_eq;
use std::time::Duration;

mod common;
use common::*;

/// A captured error arrives as exactly one failed span
#[test]
fn test_error_is_delivered_as_one_span() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    alerty::capture_error(&TracedError::new("test error"));
    session.stop();

    let spans = collector.spans();
    assert_eq!(spans.len(), 1);

    let (resource, span) = &spans[0];
    assert_eq!(span.name, "error");
    assert_eq!(exception_message(span), Some("test error"));
    assert!(exception_stacktrace(span).is_some_and(|stack| !stack.is_empty()));

    let status = span.status.as_ref().unwrap();
    assert_eq!(status.code, StatusCode::Error as i32);
    assert_eq!(status.message, "test error");

    assert_eq!(string_attr(&resource.attributes, "service.name"), Some("integration"));
    assert_eq!(string_attr(&resource.attributes, "service.version"), Some("0.1.0"));
    assert_eq!(string_attr(&resource.attributes, "deployment.environment"), Some("ci"));
    assert_eq!(string_attr(&resource.attributes, "alerty.organizationId"), Some("org_test"));
}

/// A panic inside a protected scope is delivered and suppressed
#[test]
fn test_local_panic_is_delivered_as_one_span() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    let outcome: Option<()> = alerty::recover(|| panic!("local panic"));
    session.stop();

    assert!(outcome.is_none());
    let spans = collector.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].1.name, "panic");
    assert!(exception_message(&spans[0].1).is_some_and(|message| message.contains("local panic")));
}

/// Formatted panic messages reach the collector fully rendered
#[test]
fn test_formatted_panic_message() {
    let _serial = serial();
    let collector = TestCollector::start();
    let attempts = 3;

    let session = Session::start(test_config(&collector.url())).unwrap();
    let mut handled = false;
    Recover::new()
        .handler(|_| handled = true)
        .run(|| panic!("gave up after {} attempts", attempts));
    session.stop();

    assert!(handled);
    let spans = collector.spans();
    assert_eq!(exception_message(&spans[0].1), Some("gave up after 3 attempts"));
}

/// Spans are exported in the background while the session keeps running
#[test]
fn test_spans_are_exported_before_stop() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    for attempt in 0..5 {
        alerty::capture_error(&TracedError::new(format!("retry {} failed", attempt)));
    }

    let spans = collector.wait_for_spans(5, Duration::from_secs(5));
    assert_eq!(spans.len(), 5);
    assert!(alerty::is_running());
    session.stop();

    assert_eq!(collector.spans().len(), 5);
}

/// Every span of a session is distinct and shares one resource
#[test]
fn test_spans_have_distinct_ids() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    alerty::capture_error("first");
    alerty::capture_error("second");
    session.stop();

    let spans = collector.spans();
    assert_eq!(spans.len(), 2);
    assert_ne!(spans[0].1.span_id, spans[1].1.span_id);
    assert_ne!(spans[0].1.trace_id, spans[1].1.trace_id);
    assert_eq!(spans[0].0, spans[1].0);
}

/// A collector rejecting exports never surfaces as an error
#[test]
fn test_collector_failure_is_contained() {
    let _serial = serial();
    let collector = TestCollector::start_with_status(500);

    let session = Session::start(test_config(&collector.url())).unwrap();
    alerty::capture_error("rejected by collector");
    session.stop();

    assert_eq!(collector.requests().len(), 1);
    assert!(!alerty::is_running());
}

/// An unreachable collector does not block stop beyond the shutdown timeout
#[test]
fn test_unreachable_collector() {
    let _serial = serial();
    let mut config = test_config("http://127.0.0.1:9");
    config.batch.export_timeout = Duration::from_millis(500);
    config.batch.shutdown_timeout = Duration::from_secs(2);

    let session = Session::start(config).unwrap();
    alerty::capture_error("nowhere to go");

    let started = std::time::Instant::now();
    session.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// The debug mirror receives the same spans as the collector
#[test]
fn test_debug_mirror_file() {
    let _serial = serial();
    let collector = TestCollector::start();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("alerty-debug.json");

    let mut config = test_config(&collector.url());
    config.debug = true;
    config.debug_output = Some(output.clone());

    let session = Session::start(config).unwrap();
    alerty::capture_error(&TracedError::new("mirrored failure"));
    session.stop();

    assert_eq!(collector.spans().len(), 1);
    let mirrored = std::fs::read_to_string(&output).unwrap();
    assert!(mirrored.contains("mirrored failure"));
    assert!(mirrored.contains("\"name\": \"error\""));
}

/// An explicit collector path is used verbatim
#[test]
fn test_custom_ingest_path_is_kept() {
    let _serial = serial();
    let collector = TestCollector::start();

    let url = format!("{}/custom/ingest", collector.url());
    let session = Session::start(test_config(&url)).unwrap();
    alerty::capture_error("wrong path");
    session.stop();

    assert_eq!(collector.paths(), vec!["/custom/ingest".to_string()]);
    assert!(collector.requests().is_empty());
}

/// Spans the host creates through the global provider share the pipeline
#[test]
fn test_host_spans_reach_the_collector() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    let mut span = opentelemetry::global::tracer("host").start("checkout");
    span.end();
    session.stop();

    let spans = collector.spans();
    assert_eq!(spans.len(), 1);
    let (resource, span) = &spans[0];
    assert_eq!(span.name, "checkout");
    assert_eq!(string_attr(&resource.attributes, "alerty.organizationId"), Some("org_test"));
}

/// Standard library errors are reported with their concrete type
#[test]
fn test_io_error_is_reported_with_its_type() {
    let _serial = serial();
    let collector = TestCollector::start();

    let session = Session::start(test_config(&collector.url())).unwrap();
    let error = std::fs::read("/nonexistent/alerty/settings.yaml").unwrap_err();
    alerty::capture_error(Failure::of(&error));
    session.stop();

    let spans = collector.spans();
    assert_eq!(spans.len(), 1);
    let exception = spans[0].1.events.iter().find(|event| event.name == "exception").unwrap();
    assert!(string_attr(&exception.attributes, "exception.type").is_some_and(|t| t.contains("io")));
}
