//! Session lifecycle tests through the public API.

use alerty::export::memory::is_failed;
use alerty::{AlertyError, ConfigBuilder, InMemoryExporter, Session, TracedError};
use std::thread;
use std::time::Duration;

mod common;
use common::*;

fn in_memory_session() -> (Session, InMemoryExporter) {
    let exporter = InMemoryExporter::new();
    let session =
        Session::start_with_exporters(test_config("http://127.0.0.1:4318"), vec![Box::new(exporter.clone())])
            .unwrap();
    (session, exporter)
}

#[test]
fn test_stop_without_start() {
    let _serial = serial();
    alerty::stop();
    alerty::stop();
    assert!(!alerty::is_running());
}

#[test]
fn test_double_stop_flushes_once() {
    let _serial = serial();
    let (session, exporter) = in_memory_session();

    alerty::stop();
    alerty::stop();
    drop(session);

    assert_eq!(exporter.shutdown_count(), 1);
}

#[test]
fn test_capture_after_stop_is_dropped() {
    let _serial = serial();
    let (session, exporter) = in_memory_session();
    session.stop();

    alerty::capture_error("too late");
    assert_eq!(alerty::recover(|| panic!("too late")), None::<()>);

    assert!(exporter.is_empty());
}

#[test]
fn test_second_start_fails_without_side_effects() {
    let _serial = serial();
    let (session, _) = in_memory_session();

    let result = Session::start(test_config("http://127.0.0.1:4318"));
    assert!(matches!(result, Err(AlertyError::AlreadyRunning)));
    assert!(alerty::is_running());

    session.stop();
}

#[test]
fn test_invalid_config_is_rejected() {
    let _serial = serial();
    let mut config = test_config("http://127.0.0.1:4318");
    config.organization_id.clear();
    config.require_identity = true;

    let result = Session::start(config);
    assert!(matches!(result, Err(AlertyError::Config(_))));
    assert!(!alerty::is_running());
}

#[test]
fn test_unsupported_scheme_is_a_transport_error() {
    let _serial = serial();
    let result = Session::start(test_config("ftp://collector.local"));
    assert!(result.as_ref().is_err_and(AlertyError::is_start_error));
    assert!(matches!(result, Err(AlertyError::TransportInit(_))));
}

#[test]
fn test_debug_sink_failure_aborts_start() {
    let _serial = serial();
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config("http://127.0.0.1:4318");
    config.debug = true;
    config.debug_output = Some(dir.path().join("no-such-dir").join("debug.json"));

    let result = Session::start(config);
    assert!(matches!(result, Err(AlertyError::DebugSinkInit(_))));
    assert!(!alerty::is_running());
}

#[test]
fn test_yaml_config_starts_a_session() {
    let _serial = serial();
    let yaml = r#"
organization_id: org_yaml
name: from-yaml
version: 2.0.0
environment: staging
ingest_url: http://127.0.0.1:4318
batch:
  scheduled_delay: 100ms
  shutdown_timeout: 2s
"#;
    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();
    let exporter = InMemoryExporter::new();

    let session = Session::start_with_exporters(config, vec![Box::new(exporter.clone())]).unwrap();
    alerty::capture_error("configured from yaml");
    session.stop();

    assert_eq!(exporter.len(), 1);
    assert_eq!(exporter.resource_attribute("service.name").as_deref(), Some("from-yaml"));
    assert_eq!(exporter.resource_attribute("deployment.environment").as_deref(), Some("staging"));
}

#[test]
fn test_concurrent_captures() {
    let _serial = serial();
    let (session, exporter) = in_memory_session();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            thread::spawn(move || {
                for attempt in 0..25 {
                    alerty::capture_error(&TracedError::new(format!("worker {} attempt {}", worker, attempt)));
                }
                alerty::recover(|| panic!("worker {} crashed", worker));
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    session.stop();

    let spans = exporter.spans();
    assert_eq!(spans.len(), 8 * 26);
    assert_eq!(spans.iter().filter(|span| span.name == "panic").count(), 8);
    assert!(spans.iter().all(is_failed));
}

#[test]
fn test_guard_reports_panic_escaping_its_thread() {
    let _serial = serial();
    let exporter = InMemoryExporter::new();
    let handle = exporter.clone();

    let outcome = thread::spawn(move || {
        let _session =
            Session::start_with_exporters(test_config("http://127.0.0.1:4318"), vec![Box::new(handle)]).unwrap();
        alerty::capture_error("before the crash");
        panic!("main loop crashed");
    })
    .join();

    assert!(outcome.is_err());
    assert!(!alerty::is_running());

    assert_eq!(exporter.exception_messages(), vec!["before the crash", "main loop crashed"]);
    assert_eq!(exporter.shutdown_count(), 1);
}

#[test]
fn test_recover_returns_value() {
    let _serial = serial();
    let (session, exporter) = in_memory_session();

    assert_eq!(alerty::recover(|| 40 + 2), Some(42));
    session.stop();
    assert!(exporter.is_empty());
}

#[test]
fn test_unbounded_shutdown_timeout_is_rejected() {
    let _serial = serial();
    let mut config = test_config("http://127.0.0.1:4318");
    config.batch.shutdown_timeout = Duration::MAX;

    let result = Session::start_with_exporters(config, vec![Box::new(InMemoryExporter::new())]);
    assert!(matches!(result, Err(AlertyError::Config(_))));
    assert!(!alerty::is_running());
}

#[test]
fn test_zero_scheduled_delay_is_rejected() {
    let _serial = serial();
    let mut config = test_config("http://127.0.0.1:4318");
    config.batch.scheduled_delay = Duration::ZERO;

    assert!(matches!(Session::start(config), Err(AlertyError::Config(_))));
    assert!(!alerty::is_running());
}

#[test]
fn test_session_run_reports_a_resumed_panic() {
    let _serial = serial();
    let (session, exporter) = in_memory_session();

    let outcome = thread::spawn(move || {
        session.run(|| {
            let _ = std::panic::catch_unwind(|| panic!("already handled by host"));
            std::panic::resume_unwind(Box::new("real crash"))
        })
    })
    .join();

    assert!(outcome.is_err());
    assert!(!alerty::is_running());
    assert_eq!(exporter.exception_messages(), vec!["real crash"]);
}
