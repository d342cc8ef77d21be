//! In-process lock map
//!
//! Only excludes tasks inside one cacheprog process. Separate processes
//! sharing a cache directory or bucket are not coordinated and may repeat an
//! upload for the same key.

use super::{LockGroup, LockGuard};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One async mutex per key, created on first use
#[derive(Default)]
pub struct MemoryLock {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have ever been locked
    pub fn key_count(&self) -> usize {
        self.locks.lock().len()
    }
}

#[async_trait]
impl LockGroup for MemoryLock {
    async fn acquire(&self, key: &str) -> LockGuard {
        // The map lock is released before waiting on the key itself.
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        LockGuard::held(lock.lock_owned().await)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
