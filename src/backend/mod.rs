//! Cache storage backends
//!
//! Every backend implements [`CacheBackend`]:
//! - `disk`: the local content-addressed store on its own
//! - `s3`: an S3 bucket fronted by the local store as a read-through,
//!   write-through tier
//!
//! [`DebugBackend`] wraps any of them to log each call.

mod debug;
mod disk;
pub mod local;
pub mod remote;
mod tiered;

pub use debug::DebugBackend;
pub use disk::DiskBackend;
pub use local::{EntryMeta, LocalCache};
pub use tiered::{TieredBackend, TieredOptions, UploadMode};

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::metrics::LatencyTracker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remote::S3Store;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// A cache entry found by [`CacheBackend::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Output ID stored with the entry, returned verbatim
    pub output_id: Vec<u8>,
    /// Absolute path of the body on local disk
    pub disk_path: PathBuf,
    /// Body size in bytes
    pub size: u64,
    /// When the entry was written
    pub put_time: DateTime<Utc>,
}

impl CacheHit {
    pub(crate) fn from_meta(meta: EntryMeta, disk_path: PathBuf) -> Self {
        Self {
            output_id: meta.output_id,
            disk_path,
            size: meta.size,
            put_time: meta.put_time,
        }
    }
}

/// Storage contract shared by all backends
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store `body` under `action_id` and return a local path to it
    ///
    /// The path stays readable by this process for the backend's lifetime.
    /// Writing an existing action ID replaces the entry.
    async fn put(
        &self,
        action_id: &[u8],
        output_id: &[u8],
        body: Vec<u8>,
        body_size: u64,
    ) -> CacheResult<PathBuf>;

    /// Look up `action_id`; `Ok(None)` is a miss
    async fn get(&self, action_id: &[u8]) -> CacheResult<Option<CacheHit>>;

    /// Release resources; called once when the session ends
    async fn close(&self) -> CacheResult<()>;

    /// Remove every entry
    async fn clear(&self) -> CacheResult<()>;

    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;
}

/// Backend selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local disk only
    #[default]
    Disk,
    /// S3 bucket with a local disk tier
    S3,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disk => "disk",
            Self::S3 => "s3",
        };
        write!(f, "{}", name)
    }
}

/// Reject bodies whose length doesn't match what the caller declared
pub(crate) fn check_body_size(body: &[u8], body_size: u64) -> CacheResult<()> {
    let actual = body.len() as u64;
    if actual != body_size {
        return Err(CacheError::BodySizeMismatch {
            declared: body_size,
            actual,
        });
    }
    Ok(())
}

/// Build the backend described by `config`
///
/// The debug wrapper, when enabled, is applied outermost.
pub async fn create_backend(
    config: &Config,
    tracker: Option<Arc<LatencyTracker>>,
) -> CacheResult<Arc<dyn CacheBackend>> {
    let cache_dir = config.cache_dir();
    let locks = config.cache.lock.build();
    debug!(
        backend = %config.cache.backend,
        cache_dir = %cache_dir.display(),
        lock = locks.name(),
        "Creating cache backend"
    );

    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        BackendKind::Disk => Arc::new(DiskBackend::open(&cache_dir, locks).await?),
        BackendKind::S3 => {
            let store = S3Store::connect(&config.s3).await?;
            let local = LocalCache::open(&cache_dir).await?;
            Arc::new(TieredBackend::new(
                local,
                Arc::new(store),
                locks,
                TieredOptions::from_config(&config.s3),
                tracker,
            ))
        }
    };

    if config.logging.debug {
        return Ok(Arc::new(DebugBackend::new(backend)));
    }
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backend_kind_display() {
        assert_eq!(BackendKind::Disk.to_string(), "disk");
        assert_eq!(BackendKind::S3.to_string(), "s3");
    }

    #[test]
    fn body_size_must_match() {
        assert!(check_body_size(b"test", 4).is_ok());
        assert!(matches!(
            check_body_size(b"test", 5),
            Err(CacheError::BodySizeMismatch {
                declared: 5,
                actual: 4
            })
        ));
    }

    #[tokio::test]
    async fn create_disk_backend() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().to_path_buf());

        let backend = create_backend(&config, None).await.unwrap();
        assert_eq!(backend.name(), "disk");
    }

    #[tokio::test]
    async fn debug_flag_wraps_backend() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().to_path_buf());
        config.logging.debug = true;

        let backend = create_backend(&config, None).await.unwrap();
        assert_eq!(backend.name(), "debug");
    }
}
