//! Process-wide reporting session.
//!
//! Exactly one pipeline is active per process. It lives in a lazily
//! initialized global guarded by a lock, so any code can report a failure
//! without holding a reference to it. The lifecycle is explicit:
//! `Uninitialized -> Running -> Stopped`, and `Stopped -> Running` again
//! on a new [`start`].
//!
//! While running, the pipeline's tracer provider is also the global
//! OpenTelemetry provider, so spans the host creates through
//! `opentelemetry::global` travel through the same exporters.

use crate::core::attributes::SCOPE_NAME;
use crate::core::{AlertyError, EventKind, ReportableEvent, ResourceIdentity, Result, ServiceConfig, StackOrigin};
use crate::export::{batch_processor, otlp_exporter, DebugExporter, HostExporter, SpanExporter};
use crate::normalize::{frames_of, normalize, normalize_panic_at, payload_text, Failure, UNKNOWN_PANIC};
use crate::recorder::SpanRecorder;
use crossbeam_channel::RecvTimeoutError;
use once_cell::sync::Lazy;
use opentelemetry::global::{self, GlobalTracerProvider};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Config, Tracer, TracerProvider};
use parking_lot::RwLock;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::thread;
use std::time::Duration;

static SESSION: Lazy<RwLock<SessionState>> = Lazy::new(|| RwLock::new(SessionState::Uninitialized));

/// Mirrors `SessionState::Running` without taking the lock. Read by the
/// panic hook and the OpenTelemetry error handler.
static ACTIVE: AtomicBool = AtomicBool::new(false);

static PANIC_HOOK: Once = Once::new();

static OTEL_ERRORS: Once = Once::new();

thread_local! {
    /// Panic seen by the hook, waiting to be reported from this thread.
    static IN_FLIGHT: RefCell<Option<InFlightPanic>> = RefCell::new(None);
}

/// What the hook keeps of a panic. Symbolizing the stack and building the
/// event happen later, outside the hook.
struct InFlightPanic {
    message: Option<String>,
    backtrace: Backtrace,
}

impl InFlightPanic {
    fn into_event(self) -> ReportableEvent {
        ReportableEvent {
            message: self.message.unwrap_or_else(|| UNKNOWN_PANIC.to_string()),
            kind: EventKind::Panic,
            error_type: None,
            stack: frames_of(&self.backtrace),
            stack_origin: StackOrigin::CaptureSite,
        }
    }
}

enum SessionState {
    Uninitialized,
    Running(Pipeline),
    Stopped,
}

struct Pipeline {
    provider: TracerProvider,
    tracer: Tracer,
    previous_global: GlobalTracerProvider,
    shutdown_timeout: Duration,
}

impl Pipeline {
    fn record(&self, event: &ReportableEvent) {
        SpanRecorder::new(&self.tracer).record(event);
    }

    fn shutdown(self) {
        let Pipeline {
            provider,
            tracer,
            previous_global,
            shutdown_timeout,
        } = self;

        global::set_tracer_provider(previous_global);
        drop(tracer);

        match run_bounded("shutdown", shutdown_timeout, move || provider.shutdown()) {
            Ok(Ok(())) => {},
            Ok(Err(e)) => tracing::error!(category = "shutdown", "Error shutting down exporters: {}", e),
            Err(e) => tracing::error!(category = e.category(), "Error shutting down exporters: {}", e),
        }
    }
}

/// Start reporting with the OTLP/HTTP exporter described by `config`.
///
/// In debug mode a second exporter mirrors every span to stderr or to
/// `config.debug_output`.
///
/// # Errors
///
/// - [`AlertyError::Config`] if the configuration is invalid
/// - [`AlertyError::AlreadyRunning`] if a session is already running
/// - [`AlertyError::TransportInit`] for a malformed ingest URL or a client
///   that cannot be built
/// - [`AlertyError::DebugSinkInit`] if the debug mirror cannot be opened
pub fn start(config: ServiceConfig) -> Result<()> {
    discard_stale_panic();
    config.validate()?;
    if is_running() {
        return Err(AlertyError::AlreadyRunning);
    }

    let endpoint = config.resolve_ingest_url()?;
    let network = otlp_exporter(&endpoint, config.batch.export_timeout)?;
    let debug = if config.debug {
        Some(match &config.debug_output {
            Some(path) => DebugExporter::file(path)?,
            None => DebugExporter::stderr(),
        })
    } else {
        None
    };

    tracing::debug!(endpoint = %endpoint, debug = config.debug, "Starting OTLP exporter");
    let mut processors = vec![batch_processor(network, &config.batch)];
    if let Some(debug) = debug {
        processors.push(batch_processor(debug, &config.batch));
    }

    install(&config, processors)
}

/// Start reporting to caller-provided exporters.
///
/// Each exporter runs behind its own batch processor, exactly like the
/// built-in ones.
pub fn start_with_exporters(config: ServiceConfig, exporters: Vec<Box<dyn SpanExporter>>) -> Result<()> {
    discard_stale_panic();
    config.validate()?;
    if is_running() {
        return Err(AlertyError::AlreadyRunning);
    }

    let processors = exporters
        .into_iter()
        .map(|exporter| batch_processor(HostExporter(exporter), &config.batch))
        .collect();
    install(&config, processors)
}

fn install(config: &ServiceConfig, processors: Vec<BatchSpanProcessor<TokioCurrentThread>>) -> Result<()> {
    let identity = ResourceIdentity::from_config(config);
    if !identity.is_complete() {
        tracing::warn!(
            missing = ?config.missing_identity_fields(),
            "Service identity is incomplete, spans will be partially unlabeled"
        );
    }

    {
        let mut state = SESSION.write();
        if matches!(*state, SessionState::Running(_)) {
            return Err(AlertyError::AlreadyRunning);
        }

        let provider = processors
            .into_iter()
            .fold(TracerProvider::builder(), |builder, processor| builder.with_span_processor(processor))
            .with_config(Config::default().with_resource(identity.to_resource()))
            .build();
        let tracer = provider
            .tracer_builder(SCOPE_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let previous_global = global::set_tracer_provider(provider.clone());

        *state = SessionState::Running(Pipeline {
            provider,
            tracer,
            previous_global,
            shutdown_timeout: config.batch.shutdown_timeout,
        });
        ACTIVE.store(true, Ordering::Release);
    }

    route_otel_errors();
    install_panic_hook();

    tracing::info!(
        service = %config.name,
        version = %config.version,
        environment = %config.environment,
        debug = config.debug,
        "Alerty reporting started"
    );
    Ok(())
}

/// Flush and stop the running session.
///
/// Without a running session this does nothing. When called while the
/// current thread is unwinding, the in-flight panic is reported first.
/// Shutdown waits at most `batch.shutdown_timeout`; its errors are logged,
/// never returned.
pub fn stop() {
    if thread::panicking() {
        if is_running() {
            let event = take_in_flight().map_or_else(unidentified_panic, InFlightPanic::into_event);
            with_pipeline(|pipeline| pipeline.record(&event));
        }
    } else {
        discard_stale_panic();
    }

    let pipeline = {
        let mut state = SESSION.write();
        match std::mem::replace(&mut *state, SessionState::Stopped) {
            SessionState::Running(pipeline) => pipeline,
            previous => {
                *state = previous;
                return;
            },
        }
    };
    ACTIVE.store(false, Ordering::Release);

    pipeline.shutdown();
    tracing::info!("Alerty reporting stopped");
}

/// Returns true while a session is running
pub fn is_running() -> bool {
    matches!(*SESSION.read(), SessionState::Running(_))
}

/// Export everything queued so far without stopping the session.
///
/// Waits at most `batch.shutdown_timeout`.
pub fn force_flush() {
    discard_stale_panic();
    let Some((provider, timeout)) = with_pipeline(|pipeline| (pipeline.provider.clone(), pipeline.shutdown_timeout))
    else {
        return;
    };

    match run_bounded("flush", timeout, move || provider.force_flush()) {
        Ok(results) => {
            for e in results.into_iter().filter_map(std::result::Result::err) {
                tracing::error!(category = "export", "Error flushing exporter: {}", e);
            }
        },
        Err(e) => tracing::error!(category = e.category(), "Error flushing exporters: {}", e),
    }
}

/// Report an error.
///
/// Accepts anything convertible into a [`Failure`]: a [`TracedError`],
/// an `anyhow::Error`, a `&dyn Error`, a boxed error, a message, or an
/// `Option` of those. `None` reports nothing. Any other concrete error
/// type goes through [`Failure::of`]:
///
/// ```no_run
/// use alerty::Failure;
///
/// if let Err(e) = std::fs::read("settings.yaml") {
///     alerty::capture_error(Failure::of(&e));
/// }
/// ```
///
/// [`TracedError`]: crate::TracedError
pub fn capture_error<'a>(failure: impl Into<Failure<'a>>) {
    discard_stale_panic();
    if !is_running() {
        tracing::debug!("No running Alerty session, error not reported");
        return;
    }

    contain("error", move || {
        if let Some(event) = normalize(failure.into(), EventKind::Error) {
            with_pipeline(|pipeline| pipeline.record(&event));
        }
    });
}

/// Report a panic payload, as obtained from `catch_unwind`.
pub fn capture_panic(payload: &(dyn Any + Send)) {
    report_panic_payload(payload);
}

/// Run `f`, reporting and suppressing any panic it raises.
///
/// Returns `None` if `f` panicked. Shorthand for [`Recover::new`] without
/// handlers.
pub fn recover<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    Recover::new().run(f)
}

type PanicHandler<'a> = Box<dyn FnOnce(&(dyn Any + Send)) + 'a>;

/// Panic-protected scope with handlers.
///
/// ```no_run
/// let outcome = alerty::Recover::new()
///     .handler(|payload| eprintln!("recovered: {:?}", payload.downcast_ref::<&str>()))
///     .run(|| risky_work());
/// # fn risky_work() {}
/// ```
#[must_use = "a Recover does nothing until `run` is called"]
#[derive(Default)]
pub struct Recover<'a> {
    handlers: Vec<PanicHandler<'a>>,
}

impl<'a> Recover<'a> {
    /// Scope without handlers
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler, invoked with the original payload after the panic has
    /// been reported. Handlers run in the order they were added.
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: FnOnce(&(dyn Any + Send)) + 'a,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Run `f`. A panic is reported, handed to every handler, and
    /// suppressed; `None` is returned in that case.
    pub fn run<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        discard_stale_panic();
        let payload = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                // A panic caught inside `f` must not outlive it.
                discard_stale_panic();
                return Some(value);
            },
            Err(payload) => payload,
        };

        report_panic_payload(payload.as_ref());

        for handler in self.handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload.as_ref())));
            if outcome.is_err() {
                tracing::warn!("Panic handler panicked");
            }
        }

        None
    }
}

/// Report `payload`, reusing the panic-site stack the hook recorded for
/// it when there is one.
fn report_panic_payload(payload: &(dyn Any + Send)) {
    let text = payload_text(payload);
    let panic_site = take_in_flight().filter(|in_flight| in_flight.message == text);
    if !is_running() {
        tracing::debug!("No running Alerty session, panic not reported");
        return;
    }

    contain("panic", || {
        let event = normalize_panic_at(payload, panic_site.as_ref().map(|in_flight| &in_flight.backtrace));
        with_pipeline(|pipeline| pipeline.record(&event));
    });
}

/// Guard that stops the session when dropped.
///
/// Dropping the guard while unwinding reports the panic before flushing,
/// so a panic that escapes to the top of `main` is still delivered. The
/// guard only sees what the panic hook recorded on this thread; a panic
/// re-raised with `resume_unwind` bypasses the hook, so wrap the body in
/// [`Session::run`] to report the exact payload.
#[must_use = "dropping the session stops reporting"]
#[derive(Debug)]
pub struct Session {
    _private: (),
}

impl Session {
    /// [`start`] and return a guard
    pub fn start(config: ServiceConfig) -> Result<Self> {
        start(config)?;
        Ok(Session { _private: () })
    }

    /// [`start_with_exporters`] and return a guard
    pub fn start_with_exporters(config: ServiceConfig, exporters: Vec<Box<dyn SpanExporter>>) -> Result<Self> {
        start_with_exporters(config, exporters)?;
        Ok(Session { _private: () })
    }

    /// Run `f` as the body of the session and stop afterwards.
    ///
    /// A panic escaping `f` is reported with its exact payload, the session
    /// is flushed and stopped, and the panic then continues unwinding.
    ///
    /// ```no_run
    /// # fn serve() {}
    /// let config = alerty::ConfigBuilder::new().organization_id("org_1").build()?;
    /// alerty::Session::start(config)?.run(serve);
    /// # Ok::<(), alerty::AlertyError>(())
    /// ```
    pub fn run<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        discard_stale_panic();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                report_panic_payload(payload.as_ref());
                drop(self);
                panic::resume_unwind(payload)
            },
        }
    }

    /// Stop now instead of at end of scope
    pub fn stop(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        stop();
    }
}

fn with_pipeline<F, T>(f: F) -> Option<T>
where
    F: FnOnce(&Pipeline) -> T,
{
    let state = SESSION.read();
    match &*state {
        SessionState::Running(pipeline) => Some(f(pipeline)),
        SessionState::Uninitialized | SessionState::Stopped => {
            tracing::debug!("No running Alerty session, event not reported");
            None
        },
    }
}

fn contain<F: FnOnce()>(what: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("Failed to capture {}, event discarded", what);
    }
}

/// Run `task` on a helper thread and wait for it at most `timeout`.
fn run_bounded<T, F>(what: &'static str, timeout: Duration, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name(format!("alerty-{}", what))
        .spawn(move || {
            let _ = tx.send(task());
        })?;

    rx.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => AlertyError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
        RecvTimeoutError::Disconnected => AlertyError::shutdown(format!("{} worker exited without a result", what)),
    })
}

fn unidentified_panic() -> ReportableEvent {
    ReportableEvent {
        message: UNKNOWN_PANIC.to_string(),
        kind: EventKind::Panic,
        error_type: None,
        stack: frames_of(&Backtrace::force_capture()),
        stack_origin: StackOrigin::CaptureSite,
    }
}

fn route_otel_errors() {
    OTEL_ERRORS.call_once(|| {
        let installed = global::set_error_handler(|error| {
            if ACTIVE.load(Ordering::Acquire) {
                tracing::warn!(category = "export", "OpenTelemetry error: {}", error);
            } else {
                tracing::debug!(category = "export", "OpenTelemetry error after stop: {}", error);
            }
        });
        if let Err(e) = installed {
            tracing::warn!("Failed to route OpenTelemetry errors to logs: {}", e);
        }
    });
}

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if ACTIVE.load(Ordering::Acquire) {
                stash_panic(info.payload());
            }
            previous(info);
        }));
    });
}

/// Runs inside the panic hook: a panic here aborts the process, so this
/// only copies text and takes an unresolved backtrace.
fn stash_panic(payload: &(dyn Any + Send)) {
    let in_flight = InFlightPanic {
        message: payload_text(payload),
        backtrace: Backtrace::force_capture(),
    };
    let _ = IN_FLIGHT.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            *slot = Some(in_flight);
        }
    });
}

fn take_in_flight() -> Option<InFlightPanic> {
    IN_FLIGHT
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

/// Drop a stashed panic that was caught elsewhere. Only valid while the
/// thread is not unwinding.
fn discard_stale_panic() {
    if !thread::panicking() {
        drop(take_in_flight());
    }
}
