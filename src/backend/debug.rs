//! Call-logging decorator
//!
//! Forwards everything to the wrapped backend unchanged and logs each call
//! with its outcome.

use super::{CacheBackend, CacheHit};
use crate::error::CacheResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Logs every operation of the wrapped backend
pub struct DebugBackend {
    inner: Arc<dyn CacheBackend>,
}

impl DebugBackend {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CacheBackend for DebugBackend {
    async fn put(
        &self,
        action_id: &[u8],
        output_id: &[u8],
        body: Vec<u8>,
        body_size: u64,
    ) -> CacheResult<PathBuf> {
        let action = hex::encode(action_id);
        info!(
            backend = self.inner.name(),
            action_id = %action,
            output_id = %hex::encode(output_id),
            body_size,
            "put"
        );

        let result = self.inner.put(action_id, output_id, body, body_size).await;
        match &result {
            Ok(path) => info!(action_id = %action, disk_path = %path.display(), "put stored"),
            Err(e) => warn!(action_id = %action, error = %e, "put failed"),
        }
        result
    }

    async fn get(&self, action_id: &[u8]) -> CacheResult<Option<CacheHit>> {
        let action = hex::encode(action_id);
        info!(backend = self.inner.name(), action_id = %action, "get");

        let result = self.inner.get(action_id).await;
        match &result {
            Ok(Some(hit)) => info!(
                action_id = %action,
                output_id = %hex::encode(&hit.output_id),
                size = hit.size,
                disk_path = %hit.disk_path.display(),
                "get hit"
            ),
            Ok(None) => info!(action_id = %action, "get miss"),
            Err(e) => warn!(action_id = %action, error = %e, "get failed"),
        }
        result
    }

    async fn close(&self) -> CacheResult<()> {
        info!(backend = self.inner.name(), "close");
        let result = self.inner.close().await;
        if let Err(e) = &result {
            warn!(error = %e, "close failed");
        }
        result
    }

    async fn clear(&self) -> CacheResult<()> {
        info!(backend = self.inner.name(), "clear");
        let result = self.inner.clear().await;
        if let Err(e) = &result {
            warn!(error = %e, "clear failed");
        }
        result
    }

    fn name(&self) -> &'static str {
        "debug"
    }
}
