//! Attribute keys used on exported spans and resources.

pub use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
pub use opentelemetry_semantic_conventions::trace::{
    EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE, EXCEPTION_TYPE,
};

/// Deployment environment of the reporting service
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Tenant the reporting service belongs to
pub const ORGANIZATION_ID: &str = "alerty.organizationId";

/// Whether the stack was captured at creation or at the capture call
pub const STACK_ORIGIN: &str = "alerty.stack_origin";

/// Name of the span event carrying the failure
pub const EXCEPTION_EVENT_NAME: &str = "exception";

/// Instrumentation scope reported with every span
pub const SCOPE_NAME: &str = "alerty-rs";
