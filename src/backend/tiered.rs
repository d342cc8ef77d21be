//! Remote-backed backend with a local disk tier
//!
//! The remote store is the shared source of truth; the local cache is this
//! host's fast path. Gets read through the local tier and populate it on a
//! remote hit. Puts write the local tier first (that is what the caller's
//! returned path points at) and then upload.
//!
//! In background mode an upload finishes after the put has been answered.
//! An entry is local-only from the put response until its upload task
//! completes, and `close` waits for every outstanding upload.
//!
//! Background uploads run after the key lock is released. Two puts of the
//! same action ID can therefore both upload, and their uploads may finish
//! in either order. Puts of one action ID carry the same content, so
//! whichever lands last still leaves a valid object.

use super::local::{hex_action_id, EntryMeta, LocalCache};
use super::remote::{meta_from_attributes, meta_to_attributes, RemoteStore};
use super::{check_body_size, CacheBackend, CacheHit};
use crate::config::schema::S3Config;
use crate::error::{CacheError, CacheResult};
use crate::locking::LockGroup;
use crate::metrics::LatencyTracker;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// When a put's remote upload has to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Answer the put once the local tier is written; upload afterwards
    #[default]
    Background,
    /// Answer the put only after the upload succeeded
    Sync,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Background => "background",
            Self::Sync => "sync",
        };
        write!(f, "{}", name)
    }
}

/// Tiering policy knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredOptions {
    /// Key prefix inside the remote store, without trailing slash
    pub prefix: String,
    pub upload_mode: UploadMode,
    /// Background uploads allowed in flight at once
    pub max_concurrent_uploads: usize,
}

impl TieredOptions {
    pub fn from_config(config: &S3Config) -> Self {
        Self {
            prefix: config.prefix.trim_matches('/').to_string(),
            upload_mode: config.upload_mode,
            max_concurrent_uploads: config.max_concurrent_uploads.max(1),
        }
    }
}

impl Default for TieredOptions {
    fn default() -> Self {
        Self::from_config(&S3Config::default())
    }
}

/// Remote store fronted by the local disk cache
pub struct TieredBackend {
    local: LocalCache,
    remote: Arc<dyn RemoteStore>,
    locks: Arc<dyn LockGroup>,
    options: TieredOptions,
    tracker: Option<Arc<LatencyTracker>>,
    uploads: Mutex<JoinSet<CacheResult<()>>>,
    upload_permits: Arc<Semaphore>,
    upload_failures: Mutex<Vec<String>>,
}

impl TieredBackend {
    pub fn new(
        local: LocalCache,
        remote: Arc<dyn RemoteStore>,
        locks: Arc<dyn LockGroup>,
        options: TieredOptions,
        tracker: Option<Arc<LatencyTracker>>,
    ) -> Self {
        let upload_permits = Arc::new(Semaphore::new(options.max_concurrent_uploads.max(1)));
        Self {
            local,
            remote,
            locks,
            options,
            tracker,
            uploads: Mutex::new(JoinSet::new()),
            upload_permits,
            upload_failures: Mutex::new(Vec::new()),
        }
    }

    /// Remote key for a hex action ID
    fn object_key(&self, hex_id: &str) -> String {
        if self.options.prefix.is_empty() {
            hex_id.to_string()
        } else {
            format!("{}/{}", self.options.prefix, hex_id)
        }
    }

    /// Remote prefix covering every object this backend writes
    fn remote_prefix(&self) -> String {
        if self.options.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.options.prefix)
        }
    }

    async fn timed<F: Future>(&self, operation: &str, fut: F) -> F::Output {
        match &self.tracker {
            Some(tracker) => tracker.time(operation, fut).await,
            None => fut.await,
        }
    }

    async fn local_hit(&self, action_id: &[u8]) -> CacheResult<Option<CacheHit>> {
        let Some(meta) = self.local.check(action_id).await? else {
            return Ok(None);
        };
        Ok(Some(CacheHit::from_meta(meta, self.local.entry_path(action_id)?)))
    }

    /// Remote lookup, run while holding the key
    async fn fetch_remote(&self, action_id: &[u8], hex_id: &str) -> CacheResult<Option<CacheHit>> {
        // Another task may have populated the entry while we waited.
        if let Some(hit) = self.local_hit(action_id).await? {
            return Ok(Some(hit));
        }

        let key = self.object_key(hex_id);
        let object = match self.timed("get_remote", self.remote.get_object(&key)).await {
            Ok(Some(object)) => object,
            Ok(None) => return Ok(None),
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                warn!(key = %key, error = %e, "Remote lookup failed, treating as miss");
                return Ok(None);
            }
        };

        let meta = match meta_from_attributes(&object.attributes) {
            Ok(meta) => meta,
            Err(reason) => {
                warn!(key = %key, error = %reason, "Remote object has unusable metadata");
                return Ok(None);
            }
        };
        if object.body.len() as u64 != meta.size {
            warn!(
                key = %key,
                declared = meta.size,
                actual = object.body.len(),
                "Remote object size doesn't match its metadata"
            );
            return Ok(None);
        }

        let disk_path = self
            .local
            .write_with_meta(action_id, &object.body, &meta)
            .await?;
        debug!(key = %key, size = meta.size, "Populated local tier from remote");
        Ok(Some(CacheHit::from_meta(meta, disk_path)))
    }

    /// Local write plus upload, run while holding the key
    async fn store(
        &self,
        action_id: &[u8],
        hex_id: &str,
        body: Vec<u8>,
        meta: EntryMeta,
    ) -> CacheResult<PathBuf> {
        let disk_path = self
            .timed("put_local", self.local.write_with_meta(action_id, &body, &meta))
            .await?;

        let key = self.object_key(hex_id);
        let attributes = meta_to_attributes(&meta);
        match self.options.upload_mode {
            UploadMode::Sync => {
                self.timed("put_remote", self.remote.put_object(&key, body, attributes))
                    .await?;
            }
            UploadMode::Background => self.spawn_upload(key, body, attributes),
        }

        Ok(disk_path)
    }

    fn spawn_upload(&self, key: String, body: Vec<u8>, attributes: HashMap<String, String>) {
        let remote = Arc::clone(&self.remote);
        let permits = Arc::clone(&self.upload_permits);
        let tracker = self.tracker.clone();

        let mut uploads = self.uploads.lock();
        // Reap finished uploads so the set doesn't grow for the whole session.
        while let Some(joined) = uploads.try_join_next() {
            self.note_upload_result(joined);
        }

        uploads.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CacheError::Internal("upload semaphore closed".to_string()))?;

            let start = Instant::now();
            let result = remote.put_object(&key, body, attributes).await;
            if let Some(tracker) = tracker {
                tracker.record("put_remote", start.elapsed());
            }

            match &result {
                Ok(()) => debug!(key = %key, "Background upload finished"),
                Err(e) => warn!(key = %key, error = %e, "Background upload failed"),
            }
            result
        });
    }

    fn note_upload_result(&self, joined: Result<CacheResult<()>, tokio::task::JoinError>) {
        let failure = match joined {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("upload task failed: {}", e),
        };
        self.upload_failures.lock().push(failure);
    }

    /// Wait for every outstanding background upload
    async fn drain_uploads(&self) {
        let mut uploads = std::mem::take(&mut *self.uploads.lock());
        if !uploads.is_empty() {
            info!(pending = uploads.len(), "Waiting for background uploads");
        }
        while let Some(joined) = uploads.join_next().await {
            self.note_upload_result(joined);
        }
    }
}

#[async_trait]
impl CacheBackend for TieredBackend {
    async fn put(
        &self,
        action_id: &[u8],
        output_id: &[u8],
        body: Vec<u8>,
        body_size: u64,
    ) -> CacheResult<PathBuf> {
        check_body_size(&body, body_size)?;
        let hex_id = hex_action_id(action_id)?;
        let meta = EntryMeta {
            output_id: output_id.to_vec(),
            size: body_size,
            put_time: Utc::now(),
        };

        self.locks
            .do_with_lock(&hex_id, || self.store(action_id, &hex_id, body, meta))
            .await
    }

    async fn get(&self, action_id: &[u8]) -> CacheResult<Option<CacheHit>> {
        let hex_id = hex_action_id(action_id)?;

        if let Some(hit) = self.timed("get_local", self.local_hit(action_id)).await? {
            return Ok(Some(hit));
        }

        self.locks
            .do_with_lock(&hex_id, || self.fetch_remote(action_id, &hex_id))
            .await
    }

    async fn close(&self) -> CacheResult<()> {
        self.drain_uploads().await;

        let failures = std::mem::take(&mut *self.upload_failures.lock());
        match failures.first() {
            Some(first) => Err(CacheError::UploadsFailed {
                failed: failures.len(),
                first: first.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        // Uploads still in flight would recreate objects after the delete.
        self.drain_uploads().await;

        let removed_local = self.local.clear().await?;
        let removed_remote = self.remote.delete_prefix(&self.remote_prefix()).await?;
        info!(
            removed_local,
            removed_remote,
            store = self.remote.name(),
            "Cleared local and remote cache"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
