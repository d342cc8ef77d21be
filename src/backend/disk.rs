//! Local-disk-only backend

use super::local::{hex_action_id, EntryMeta, LocalCache};
use super::{check_body_size, CacheBackend, CacheHit};
use crate::error::CacheResult;
use crate::locking::LockGroup;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Serves every request from the local content-addressed store
pub struct DiskBackend {
    local: LocalCache,
    locks: Arc<dyn LockGroup>,
}

impl DiskBackend {
    /// Open the store rooted at `cache_dir`
    pub async fn open(cache_dir: &Path, locks: Arc<dyn LockGroup>) -> CacheResult<Self> {
        let local = LocalCache::open(cache_dir).await?;
        Ok(Self::new(local, locks))
    }

    pub fn new(local: LocalCache, locks: Arc<dyn LockGroup>) -> Self {
        Self { local, locks }
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    async fn put(
        &self,
        action_id: &[u8],
        output_id: &[u8],
        body: Vec<u8>,
        body_size: u64,
    ) -> CacheResult<PathBuf> {
        check_body_size(&body, body_size)?;
        let key = hex_action_id(action_id)?;
        let meta = EntryMeta {
            output_id: output_id.to_vec(),
            size: body_size,
            put_time: Utc::now(),
        };

        self.locks
            .do_with_lock(&key, || self.local.write_with_meta(action_id, &body, &meta))
            .await
    }

    async fn get(&self, action_id: &[u8]) -> CacheResult<Option<CacheHit>> {
        let key = hex_action_id(action_id)?;

        // Held so a concurrent put can't be seen with the old sidecar and new body.
        let _guard = self.locks.acquire(&key).await;
        let Some(meta) = self.local.check(action_id).await? else {
            return Ok(None);
        };
        let disk_path = self.local.entry_path(action_id)?;
        Ok(Some(CacheHit::from_meta(meta, disk_path)))
    }

    async fn close(&self) -> CacheResult<()> {
        debug!("Closing disk backend");
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        let removed = self.local.clear().await?;
        info!(removed, root = %self.local.root().display(), "Cleared local cache");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
