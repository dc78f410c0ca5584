use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertyError {
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    #[error("Debug sink initialization failed: {0}")]
    DebugSinkInit(String),

    #[error("Reporting session is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Alerty operations
pub type Result<T> = std::result::Result<T, AlertyError>;

impl AlertyError {
    /// Creates a new transport initialization error
    pub fn transport_init<S: Into<String>>(msg: S) -> Self {
        Self::TransportInit(msg.into())
    }

    /// Creates a new debug sink initialization error
    pub fn debug_sink_init<S: Into<String>>(msg: S) -> Self {
        Self::DebugSinkInit(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new shutdown error
    pub fn shutdown<S: Into<String>>(msg: S) -> Self {
        Self::Shutdown(msg.into())
    }

    /// Returns true if this error happened while starting the session
    pub fn is_start_error(&self) -> bool {
        matches!(
            self,
            Self::TransportInit(_) | Self::DebugSinkInit(_) | Self::AlreadyRunning | Self::Config(_)
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::TransportInit(_) => "transport",
            Self::DebugSinkInit(_) => "debug_sink",
            Self::AlreadyRunning => "lifecycle",
            Self::Config(_) => "config",
            Self::Shutdown(_) => "shutdown",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}
