//! Core domain types for Alerty.
//!
//! Configuration, the error taxonomy, and the records that flow from a
//! capture call to the exporters.

#![warn(missing_docs)]

pub mod attributes;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{BatchConfig, ConfigBuilder, ServiceConfig, DEFAULT_INGEST_URL, MAX_BATCH_DURATION};
pub use error::{AlertyError, Result};
pub use types::{EventKind, ReportableEvent, ResourceIdentity, StackFrame, StackOrigin};
