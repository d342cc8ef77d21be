//! Configuration schema for cacheprog
//!
//! Configuration is stored at `~/.config/cacheprog/config.toml`. Every field
//! has a default, so an empty or missing file is valid.

use crate::backend::{BackendKind, UploadMode};
use crate::locking::LockKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend and local store settings
    pub cache: CacheConfig,

    /// Remote bucket settings, used by the `s3` backend
    pub s3: S3Config,

    /// Diagnostics settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Directory holding the local store
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(default_cache_dir)
    }
}

/// Default local store location
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cacheprog")
}

/// Backend selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which backend serves requests
    pub backend: BackendKind,

    /// Local store directory (default: the user cache dir)
    pub dir: Option<PathBuf>,

    /// Per-key exclusion flavour
    pub lock: LockKind,
}

/// S3 bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Bucket name; required by the `s3` backend
    pub bucket: Option<String>,

    /// Key prefix for every object
    pub prefix: String,

    /// Region override (default: the AWS config chain)
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores
    pub endpoint_url: Option<String>,

    /// Per-operation timeout in seconds
    pub timeout_secs: u64,

    /// When a put's upload has to finish
    pub upload_mode: UploadMode,

    /// Background uploads in flight at once
    pub max_concurrent_uploads: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: "cacheprog".to_string(),
            region: None,
            endpoint_url: None,
            timeout_secs: 30,
            upload_mode: UploadMode::default(),
            max_concurrent_uploads: 16,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log every backend call
    pub debug: bool,

    /// Print latency stats to stderr when the session ends
    pub stats: bool,

    /// Log format: "text" or "json"
    pub format: LogFormat,
}
