use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::attributes;
use crate::core::config::ServiceConfig;

/// Origin of a reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Explicitly captured error value
    Error,
    /// Unrecovered panic
    Panic,
}

impl EventKind {
    /// Span name used for events of this kind
    pub fn span_name(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::Panic => "panic",
        }
    }
}

/// Where the stack attached to an event was taken.
///
/// `Creation` stacks were captured when the failure value was built and
/// point at the origin. `CaptureSite` stacks were captured by the reporting
/// call and only show where the failure was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOrigin {
    /// Captured when the failure value was constructed
    Creation,
    /// Captured at the capture call
    CaptureSite,
}

impl StackOrigin {
    /// Attribute value recorded on the span
    pub fn as_str(&self) -> &'static str {
        match self {
            StackOrigin::Creation => "creation",
            StackOrigin::CaptureSite => "capture_site",
        }
    }
}

/// One frame of a captured stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Position in the backtrace, 0 is innermost
    pub index: usize,
    /// Demangled symbol name
    pub symbol: String,
    /// `file:line:column`, when debug info is available
    pub location: Option<String>,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.index, self.symbol)?;
        if let Some(location) = &self.location {
            write!(f, "\n             at {}", location)?;
        }
        Ok(())
    }
}

/// Uniform record built from an error value or a panic payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportableEvent {
    /// Human-readable failure description
    pub message: String,
    /// Error or panic
    pub kind: EventKind,
    /// Type of the failure value when known
    pub error_type: Option<String>,
    /// Ordered frames, innermost first
    pub stack: Option<Vec<StackFrame>>,
    /// Which capture policy produced `stack`
    pub stack_origin: StackOrigin,
}

impl ReportableEvent {
    /// Render the stack the way it is attached to the exported span
    pub fn render_stack(&self) -> Option<String> {
        self.stack.as_ref().map(|frames| {
            frames
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Returns true if any frame symbol contains `needle`
    pub fn stack_mentions(&self, needle: &str) -> bool {
        self.stack
            .as_ref()
            .map_or(false, |frames| frames.iter().any(|f| f.symbol.contains(needle)))
    }
}

/// Identity attributes attached to every span from this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// Tenant identifier
    pub organization_id: String,
    /// Service name
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Deployment environment
    pub environment: String,
}

impl ResourceIdentity {
    /// Build the identity from session configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        ResourceIdentity {
            organization_id: config.organization_id.clone(),
            service_name: config.name.clone(),
            service_version: config.version.clone(),
            environment: config.environment.clone(),
        }
    }

    /// Returns true when every identity field is set
    pub fn is_complete(&self) -> bool {
        !(self.organization_id.is_empty()
            || self.service_name.is_empty()
            || self.service_version.is_empty()
            || self.environment.is_empty())
    }

    /// Resource attributes in export order
    pub fn attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(attributes::SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(attributes::SERVICE_VERSION, self.service_version.clone()),
            KeyValue::new(attributes::DEPLOYMENT_ENVIRONMENT, self.environment.clone()),
            KeyValue::new(attributes::ORGANIZATION_ID, self.organization_id.clone()),
        ]
    }

    /// SDK resource carried by every exported span
    pub fn to_resource(&self) -> Resource {
        Resource::new(self.attributes())
    }
}
