//! Error types for cacheprog
//!
//! All modules use `CacheResult<T>` as their return type. Which variants end a
//! protocol session and which only fail a single request is decided by the
//! protocol engine, not here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cacheprog operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in cacheprog
#[derive(Error, Debug)]
pub enum CacheError {
    // Protocol framing errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed request {line:?}: {source}")]
    MalformedRequest {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed body line: {0}")]
    MalformedBody(String),

    // Backend request errors
    #[error("Invalid action ID: {0}")]
    InvalidActionId(String),

    #[error("Body size mismatch: declared {declared} bytes, got {actual}")]
    BodySizeMismatch { declared: u64, actual: u64 },

    #[error("Invalid body size: {0}")]
    InvalidBodySize(i64),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("{failed} background upload(s) failed; first error: {first}")]
    UploadsFailed { failed: usize, first: String },

    // Metrics errors
    #[error("No latency data for operation: {0}")]
    NoMetrics(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to create cache directory {path}: {source}")]
    CacheDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a protocol framing error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether a remote failure points at an outage worth surfacing
    ///
    /// Anything else coming back from the remote tier is degraded to a miss.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RemoteUnavailable(_) => {
                Some("Check AWS credentials and that the bucket exists and is accessible")
            }
            Self::ConfigInvalid { .. } | Self::Config(_) => {
                Some("Run: cacheprog config to inspect the resolved configuration")
            }
            Self::CacheDirCreate { .. } => Some("Set --cache-dir to a writable directory"),
            _ => None,
        }
    }
}
