//! Configuration for an Alerty reporting session.
//!
//! This module provides:
//! - Service identity (organization, name, version, environment)
//! - Ingest endpoint resolution with a hosted default
//! - Batch export tuning
//! - YAML loading and validation

use crate::core::{AlertyError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hosted collector used when no ingest URL is configured.
pub const DEFAULT_INGEST_URL: &str = "https://ingest.alerty.ai";

/// Path appended to ingest URLs that carry no path of their own.
pub const TRACES_PATH: &str = "/v1/traces";

/// Largest accepted value for any batch delay or timeout.
pub const MAX_BATCH_DURATION: Duration = Duration::from_secs(3600);

/// Complete configuration for a reporting session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Tenant identifier attached to every span
    pub organization_id: String,
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Deployment environment
    pub environment: String,
    /// Collector URL, empty for the hosted default
    pub ingest_url: String,
    /// Mirror every span to a local human-readable sink
    pub debug: bool,
    /// Write the debug mirror to this file instead of stderr
    pub debug_output: Option<PathBuf>,
    /// Reject empty identity fields at start
    pub require_identity: bool,
    /// Batch export configuration
    pub batch: BatchConfig,
}

/// Batch export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Spans buffered per exporter before new spans are dropped
    pub max_queue_size: usize,
    /// Maximum spans sent in one export call
    pub max_export_batch_size: usize,
    /// Delay between scheduled exports
    #[serde(with = "humantime_serde")]
    pub scheduled_delay: Duration,
    /// Timeout for a single export call
    #[serde(with = "humantime_serde")]
    pub export_timeout: Duration,
    /// Upper bound on the flush performed by stop
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            organization_id: String::new(),
            name: String::new(),
            version: String::new(),
            environment: String::new(),
            ingest_url: String::new(),
            debug: false,
            debug_output: None,
            require_identity: false,
            batch: BatchConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_secs(5),
            export_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_queue_size == 0 {
            return Err(AlertyError::config("max_queue_size must be greater than 0"));
        }

        if self.batch.max_export_batch_size == 0 {
            return Err(AlertyError::config("max_export_batch_size must be greater than 0"));
        }

        if self.batch.max_export_batch_size > self.batch.max_queue_size {
            return Err(AlertyError::config(format!(
                "max_export_batch_size ({}) must not exceed max_queue_size ({})",
                self.batch.max_export_batch_size, self.batch.max_queue_size
            )));
        }

        for (field, value) in [
            ("scheduled_delay", self.batch.scheduled_delay),
            ("export_timeout", self.batch.export_timeout),
            ("shutdown_timeout", self.batch.shutdown_timeout),
        ] {
            if value.is_zero() {
                return Err(AlertyError::config(format!("{} must be greater than 0", field)));
            }
            if value > MAX_BATCH_DURATION {
                return Err(AlertyError::config(format!(
                    "{} ({:?}) must not exceed {:?}",
                    field, value, MAX_BATCH_DURATION
                )));
            }
        }

        if self.require_identity {
            let missing = self.missing_identity_fields();
            if !missing.is_empty() {
                return Err(AlertyError::config(format!(
                    "missing required identity fields: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Names of required identity fields that are empty
    pub fn missing_identity_fields(&self) -> Vec<&'static str> {
        [
            ("organization_id", &self.organization_id),
            ("name", &self.name),
            ("version", &self.version),
            ("environment", &self.environment),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Resolve the URL spans are posted to.
    ///
    /// An empty ingest URL falls back to [`DEFAULT_INGEST_URL`]. A URL with
    /// no path gets [`TRACES_PATH`]; any other path is used verbatim.
    pub fn resolve_ingest_url(&self) -> Result<Url> {
        let raw = self.ingest_url.trim();
        let raw = if raw.is_empty() { DEFAULT_INGEST_URL } else { raw };

        let mut url = Url::parse(raw)
            .map_err(|e| AlertyError::transport_init(format!("invalid ingest URL '{}': {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => {},
            other => {
                return Err(AlertyError::transport_init(format!(
                    "unsupported ingest URL scheme '{}'",
                    other
                )))
            },
        }

        if url.path().is_empty() || url.path() == "/" {
            url.set_path(TRACES_PATH);
        }

        Ok(url)
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: ServiceConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: ServiceConfig::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| AlertyError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set organization ID
    pub fn organization_id(mut self, id: impl Into<String>) -> Self {
        self.config.organization_id = id.into();
        self
    }

    /// Set service name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set service version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set deployment environment
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    /// Set ingest URL
    pub fn ingest_url(mut self, url: impl Into<String>) -> Self {
        self.config.ingest_url = url.into();
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Set debug output file
    pub fn debug_output(mut self, path: PathBuf) -> Self {
        self.config.debug_output = Some(path);
        self
    }

    /// Reject empty identity fields
    pub fn require_identity(mut self, require: bool) -> Self {
        self.config.require_identity = require;
        self
    }

    /// Set scheduled export delay
    pub fn scheduled_delay(mut self, delay: Duration) -> Self {
        self.config.batch.scheduled_delay = delay;
        self
    }

    /// Set export timeout
    pub fn export_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch.export_timeout = timeout;
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch.shutdown_timeout = timeout;
        self
    }

    /// Set queue and batch sizes
    pub fn batch_sizes(mut self, max_queue_size: usize, max_export_batch_size: usize) -> Self {
        self.config.batch.max_queue_size = max_queue_size;
        self.config.batch.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
