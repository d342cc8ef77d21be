//! Lock group that performs no locking

use super::{LockGroup, LockGuard};
use async_trait::async_trait;

/// Runs every critical section immediately
///
/// Fine when writers only ever rename complete files into place, and in
/// tests that don't exercise contention.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

impl NoopLock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LockGroup for NoopLock {
    async fn acquire(&self, _key: &str) -> LockGuard {
        LockGuard::unlocked()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_can_be_held_twice() {
        let group = NoopLock::new();
        let _first = group.acquire("k").await;
        let _second = tokio::time::timeout(Duration::from_secs(1), group.acquire("k"))
            .await
            .expect("noop lock never blocks");
    }
}
