//! Turning failure values into [`ReportableEvent`]s.
//!
//! Two capabilities are kept apart by type, not detected at run time:
//!
//! - stack-capturing failures ([`TracedError`], `anyhow::Error` with a
//!   captured backtrace) carry the stack of the place they were built, and
//!   that stack is reported verbatim;
//! - plain failures carry no stack, so one is captured where the failure is
//!   reported. That stack only shows the reporting call, never the origin.
//!
//! Panic payloads are classified once, at the interception boundary, into
//! a [`PanicPayload`].

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

use crate::core::{EventKind, ReportableEvent, StackFrame, StackOrigin};

/// Message reported for panic payloads that are neither text nor a known error.
pub const UNKNOWN_PANIC: &str = "unknown panic";

/// An error that records the call stack at the point it is constructed.
#[derive(Debug)]
pub struct TracedError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl TracedError {
    /// Create an error with the given message, capturing the current stack.
    pub fn new(message: impl Into<String>) -> Self {
        TracedError {
            message: message.into(),
            source: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Wrap an existing error with context, capturing the current stack.
    pub fn wrap<E>(source: E, context: impl Into<String>) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        TracedError {
            message: context.into(),
            source: Some(Box::new(source)),
            backtrace: Backtrace::force_capture(),
        }
    }

    /// The context message, without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for TracedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

/// A failure value handed to a capture call.
#[derive(Debug)]
pub enum Failure<'a> {
    /// The failure carries the stack of its construction site.
    StackCapturing {
        /// Failure message
        message: String,
        /// Type of the failure value
        error_type: Option<String>,
        /// Stack captured at construction
        stack: &'a Backtrace,
    },
    /// The failure carries no stack of its own.
    Plain {
        /// Failure message
        message: String,
        /// Type of the failure value
        error_type: Option<String>,
    },
    /// No failure; capturing it reports nothing.
    Absent,
}

impl<'a> Failure<'a> {
    /// Treat any error as plain, recording its concrete type name.
    pub fn plain<E: Error + ?Sized>(error: &E) -> Failure<'static> {
        Failure::Plain {
            message: error.to_string(),
            error_type: Some(std::any::type_name::<E>().to_string()),
        }
    }

    /// Classify any concrete error value.
    ///
    /// A [`TracedError`] keeps its creation stack; every other type is
    /// plain and recorded with its type name.
    ///
    /// ```
    /// use alerty::Failure;
    ///
    /// let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
    /// assert!(matches!(Failure::of(&error), Failure::Plain { .. }));
    /// ```
    pub fn of<E: Error + 'static>(error: &'a E) -> Failure<'a> {
        match (error as &(dyn Error + 'static)).downcast_ref::<TracedError>() {
            Some(traced) => Failure::from(traced),
            None => Failure::plain(error),
        }
    }

    /// Returns true for [`Failure::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Failure::Absent)
    }
}

impl<'a> From<&'a TracedError> for Failure<'a> {
    fn from(error: &'a TracedError) -> Self {
        Failure::StackCapturing {
            message: error.to_string(),
            error_type: Some(std::any::type_name::<TracedError>().to_string()),
            stack: error.backtrace(),
        }
    }
}

impl<'a> From<&'a anyhow::Error> for Failure<'a> {
    fn from(error: &'a anyhow::Error) -> Self {
        let message = format!("{:#}", error);
        let error_type = Some(std::any::type_name::<anyhow::Error>().to_string());
        let stack = error.backtrace();
        if stack.status() == BacktraceStatus::Captured {
            Failure::StackCapturing {
                message,
                error_type,
                stack,
            }
        } else {
            Failure::Plain {
                message,
                error_type,
            }
        }
    }
}

impl<'a> From<&'a (dyn Error + 'static)> for Failure<'a> {
    fn from(error: &'a (dyn Error + 'static)) -> Self {
        match error.downcast_ref::<TracedError>() {
            Some(traced) => Failure::from(traced),
            None => Failure::Plain {
                message: error.to_string(),
                error_type: None,
            },
        }
    }
}

impl<'a> From<&'a (dyn Error + Send + Sync + 'static)> for Failure<'a> {
    fn from(error: &'a (dyn Error + Send + Sync + 'static)) -> Self {
        Failure::from(error as &(dyn Error + 'static))
    }
}

impl<'a> From<&'a Box<dyn Error + Send + Sync + 'static>> for Failure<'a> {
    fn from(error: &'a Box<dyn Error + Send + Sync + 'static>) -> Self {
        Failure::from(&**error)
    }
}

impl<'a> From<&'a str> for Failure<'a> {
    fn from(message: &'a str) -> Self {
        Failure::Plain {
            message: message.to_string(),
            error_type: None,
        }
    }
}

impl<'a, T> From<Option<T>> for Failure<'a>
where
    T: Into<Failure<'a>>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Failure::Absent, Into::into)
    }
}

/// A panic payload, classified at the interception boundary.
#[derive(Debug)]
pub enum PanicPayload<'a> {
    /// `panic!("...")` style payloads
    Message(&'a str),
    /// Payloads that are a recognized error type
    Error(Failure<'a>),
    /// Anything else
    Opaque,
}

impl<'a> PanicPayload<'a> {
    /// Classify a payload as produced by `catch_unwind` or a panic hook.
    ///
    /// Recognized error payloads are [`TracedError`], `anyhow::Error` and
    /// `Box<dyn Error + Send + Sync>`.
    pub fn classify(payload: &'a (dyn Any + Send)) -> Self {
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            PanicPayload::Message(*message)
        } else if let Some(message) = payload.downcast_ref::<String>() {
            PanicPayload::Message(message.as_str())
        } else if let Some(error) = payload.downcast_ref::<TracedError>() {
            PanicPayload::Error(Failure::from(error))
        } else if let Some(error) = payload.downcast_ref::<anyhow::Error>() {
            PanicPayload::Error(Failure::from(error))
        } else if let Some(error) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
            PanicPayload::Error(Failure::from(&**error as &(dyn Error + Send + Sync + 'static)))
        } else {
            PanicPayload::Opaque
        }
    }

    /// The message this payload is reported with.
    pub fn message(&self) -> String {
        match self {
            PanicPayload::Message(message) => (*message).to_string(),
            PanicPayload::Error(Failure::StackCapturing { message, .. })
            | PanicPayload::Error(Failure::Plain { message, .. }) => message.clone(),
            PanicPayload::Error(Failure::Absent) | PanicPayload::Opaque => {
                UNKNOWN_PANIC.to_string()
            },
        }
    }

    fn into_failure(self) -> Failure<'a> {
        match self {
            PanicPayload::Message(message) => Failure::Plain {
                message: message.to_string(),
                error_type: None,
            },
            PanicPayload::Error(Failure::Absent) | PanicPayload::Opaque => Failure::Plain {
                message: UNKNOWN_PANIC.to_string(),
                error_type: None,
            },
            PanicPayload::Error(failure) => failure,
        }
    }
}

/// Build an event from a failure value; `None` for an absent failure.
pub fn normalize(failure: Failure<'_>, kind: EventKind) -> Option<ReportableEvent> {
    match failure {
        Failure::Absent => None,
        Failure::StackCapturing {
            message,
            error_type,
            stack,
        } => Some(ReportableEvent {
            message,
            kind,
            error_type,
            stack: frames_of(stack),
            stack_origin: StackOrigin::Creation,
        }),
        Failure::Plain {
            message,
            error_type,
        } => Some(ReportableEvent {
            message,
            kind,
            error_type,
            stack: frames_of(&Backtrace::force_capture()),
            stack_origin: StackOrigin::CaptureSite,
        }),
    }
}

/// Build a panic event from a raw payload. Never fails.
pub fn normalize_panic(payload: &(dyn Any + Send)) -> ReportableEvent {
    normalize_panic_at(payload, None)
}

/// Build a panic event from a raw payload and, optionally, the stack taken
/// where the panic was raised.
///
/// Payloads carrying a creation stack keep it. For every other payload the
/// panic-site stack is used when given, otherwise one is captured here.
pub fn normalize_panic_at(payload: &(dyn Any + Send), panic_site: Option<&Backtrace>) -> ReportableEvent {
    let failure = PanicPayload::classify(payload).into_failure();
    match (failure, panic_site) {
        (Failure::Plain { message, error_type }, Some(site)) => ReportableEvent {
            message,
            kind: EventKind::Panic,
            error_type,
            stack: frames_of(site),
            stack_origin: StackOrigin::CaptureSite,
        },
        (failure, _) => normalize(failure, EventKind::Panic).unwrap_or_else(|| ReportableEvent {
            message: UNKNOWN_PANIC.to_string(),
            kind: EventKind::Panic,
            error_type: None,
            stack: None,
            stack_origin: StackOrigin::CaptureSite,
        }),
    }
}

/// Message of a panic payload, extracted without running any `Display`
/// implementation. Safe to call from a panic hook.
pub fn payload_text(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        Some((*message).to_string())
    } else if let Some(message) = payload.downcast_ref::<String>() {
        Some(message.clone())
    } else {
        payload
            .downcast_ref::<TracedError>()
            .map(|error| error.message().to_string())
    }
}

/// Split a captured backtrace into frames; `None` when nothing was captured.
pub fn frames_of(backtrace: &Backtrace) -> Option<Vec<StackFrame>> {
    if backtrace.status() != BacktraceStatus::Captured {
        return None;
    }
    Some(parse_frames(&backtrace.to_string()))
}

fn parse_frames(rendered: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in rendered.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                frame.location = Some(location.to_string());
            }
            continue;
        }

        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if let Ok(index) = index.parse::<usize>() {
            frames.push(StackFrame {
                index,
                symbol: symbol.to_string(),
                location: None,
            });
        }
    }

    frames
}
