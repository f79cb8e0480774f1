//! In-memory engine for tests and ephemeral nodes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use ember_core::error::StoreError;

use super::batch::{BatchOp, WriteBatch};
use super::{KeyValueEngine, KvIter};

#[derive(Default)]
pub struct MemoryEngine {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent batch write fail without applying anything.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KeyValueEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn iter_from<'a>(&'a self, start: &[u8]) -> KvIter<'a> {
        // Snapshot so the caller never holds the lock across iteration.
        let entries: Vec<_> = self
            .inner
            .read()
            .range(start.to_vec()..)
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Box::new(entries.into_iter())
    }

    fn write(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Commit("injected write failure".into()));
        }
        let mut guard = self.inner.write();
        for op in batch.iter() {
            match op {
                BatchOp::Put { key, value } => {
                    guard.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    guard.remove(key);
                }
            }
        }
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), StoreError> {
        self.inner.get_mut().clear();
        Ok(())
    }
}
