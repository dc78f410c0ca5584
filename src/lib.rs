//! Alerty - error and panic reporting over OpenTelemetry.
//!
//! Alerty turns failures into OTLP spans and ships them to the Alerty
//! ingest service. Each reported error or panic becomes one span with an
//! error status and an `exception` event carrying the message, the type
//! and the stack trace.
//!
//! # Architecture
//!
//! - `normalize`: turns errors and panic payloads into reportable events
//! - `recorder`: builds failed spans from events
//! - `export`: SDK batch processors over the OTLP/HTTP exporter and the
//!   debug mirror
//! - `session`: the process-wide lifecycle and capture entry points
//! - `core`: configuration, error types and domain models
//!
//! # Example
//!
//! ```no_run
//! use alerty::{ConfigBuilder, Session, TracedError};
//!
//! fn main() -> alerty::Result<()> {
//!     let config = ConfigBuilder::new()
//!         .organization_id("org_123")
//!         .name("checkout")
//!         .version("1.4.2")
//!         .environment("production")
//!         .build()?;
//!     let _session = Session::start(config)?;
//!
//!     alerty::capture_error(&TracedError::new("payment provider unavailable"));
//!     alerty::recover(|| panic!("worker crashed"));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod core;
pub mod export;
pub mod normalize;
pub mod recorder;
pub mod session;

// Re-export the capture surface for convenience
pub use crate::core::{AlertyError, ConfigBuilder, Result, ServiceConfig};
pub use crate::export::{DebugExporter, InMemoryExporter, SpanExporter};
pub use crate::normalize::{Failure, PanicPayload, TracedError};
pub use crate::session::{
    capture_error, capture_panic, force_flush, is_running, recover, start, start_with_exporters, stop,
    Recover, Session,
};
