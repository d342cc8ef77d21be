//! In-process object store
//!
//! Behaves like a bucket without the network. Failures can be injected to
//! exercise the tiered backend's error policy.

use super::{RemoteObject, RemoteStore};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Failure to inject into upcoming calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Looks like a timeout or 5xx
    Transient,
    /// Looks like rejected credentials or a missing bucket
    Systemic,
}

/// Object store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    failures: Mutex<Vec<InjectedFailure>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call (of any kind) with `failure`
    pub fn fail_next(&self, failure: InjectedFailure) {
        self.failures.lock().push(failure);
    }

    /// Number of `get_object` calls that reached the store
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put_object` calls that stored an object
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Keys currently stored, in order
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Insert an object directly, bypassing failure injection
    pub fn insert(&self, key: &str, object: RemoteObject) {
        self.objects.lock().insert(key.to_string(), object);
    }

    fn take_failure(&self) -> CacheResult<()> {
        let failure = {
            let mut failures = self.failures.lock();
            if failures.is_empty() {
                None
            } else {
                Some(failures.remove(0))
            }
        };
        match failure {
            None => Ok(()),
            Some(InjectedFailure::Transient) => {
                Err(CacheError::Remote("injected transient failure".to_string()))
            }
            Some(InjectedFailure::Systemic) => Err(CacheError::RemoteUnavailable(
                "injected systemic failure".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_object(&self, key: &str) -> CacheResult<Option<RemoteObject>> {
        self.take_failure()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().get(key).cloned())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> CacheResult<()> {
        self.take_failure()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .insert(key.to_string(), RemoteObject { body, attributes });
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.take_failure()?;
        let mut objects = self.objects.lock();
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        store
            .put_object("p/a", b"1".to_vec(), HashMap::new())
            .await
            .unwrap();
        store
            .put_object("q/b", b"2".to_vec(), HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.get_object("p/a").await.unwrap().unwrap().body, b"1");
        assert!(store.get_object("p/missing").await.unwrap().is_none());

        assert_eq!(store.delete_prefix("p/").await.unwrap(), 1);
        assert_eq!(store.keys(), vec!["q/b"]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.fail_next(InjectedFailure::Transient);
        store.fail_next(InjectedFailure::Systemic);

        assert!(matches!(
            store.get_object("k").await,
            Err(CacheError::Remote(_))
        ));
        assert!(matches!(
            store.get_object("k").await,
            Err(CacheError::RemoteUnavailable(_))
        ));
        assert!(store.get_object("k").await.unwrap().is_none());
        assert_eq!(store.get_count(), 1);
    }
}
