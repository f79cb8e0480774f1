//! Keyed record store over a pluggable ordered key-value engine.
//!
//! Records are addressed by a [`RecordKey`]: the bincode encoding of either
//! `(record_type, hash)` or a bare singleton name. All keys of one record
//! type therefore share the encoded-name prefix, which is what
//! [`RecordStore::scan_prefix`] walks.
//!
//! A store handle holds at most one open batch. While it is open, every
//! write is recorded in the batch and every read consults the batch before
//! the engine, so callers see their own uncommitted writes and never a
//! half-applied transaction.

pub mod batch;
pub mod memory;
pub mod rocks;

use bincode::{Decode, Encode};
use tracing::{debug, warn};

use ember_core::error::StoreError;
use ember_core::types::Hash256;

pub use batch::{BatchOp, Overlay, WriteBatch};
pub use memory::MemoryEngine;
pub use rocks::RocksEngine;

/// A raw key/value pair from an engine scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Forward iterator over engine entries.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a>;

/// Minimal ordered key-value engine interface.
pub trait KeyValueEngine: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Entries with key `>= start`, in ascending key order.
    fn iter_from<'a>(&'a self, start: &[u8]) -> KvIter<'a>;

    /// Apply every operation in `batch` atomically.
    fn write(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// Destroy all data and leave the engine open and empty.
    fn wipe(&mut self) -> Result<(), StoreError>;
}

fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(value)
}

/// Serialized record key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey(Vec<u8>);

impl RecordKey {
    /// Key for `(record_type, hash)`.
    pub fn keyed(record_type: &str, hash: &Hash256) -> Result<Self, StoreError> {
        encode(&(record_type, *hash)).map(Self)
    }

    /// Key for a singleton record such as `"hashBestChain"`.
    pub fn singleton(name: &str) -> Result<Self, StoreError> {
        encode(&name).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub struct RecordStore<E> {
    engine: E,
    active: Option<WriteBatch>,
}

impl<E: KeyValueEngine> RecordStore<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            active: None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Read and decode a record, honouring the open batch.
    pub fn read<V: Decode<()>>(&self, key: &RecordKey) -> Result<Option<V>, StoreError> {
        if let Some(batch) = &self.active {
            match batch.lookup(key.as_bytes()) {
                Overlay::Value(bytes) => return decode(bytes).map(Some),
                Overlay::Deleted => return Ok(None),
                Overlay::Untouched => {}
            }
        }
        match self.engine.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Write a record: into the open batch if any, else straight through.
    pub fn write<V: Encode>(&mut self, key: &RecordKey, value: &V) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        match &mut self.active {
            Some(batch) => {
                batch.put(key.as_bytes(), bytes);
                Ok(())
            }
            None => self.engine.put(key.as_bytes(), &bytes),
        }
    }

    pub fn erase(&mut self, key: &RecordKey) -> Result<(), StoreError> {
        match &mut self.active {
            Some(batch) => {
                batch.delete(key.as_bytes());
                Ok(())
            }
            None => self.engine.delete(key.as_bytes()),
        }
    }

    pub fn exists(&self, key: &RecordKey) -> Result<bool, StoreError> {
        if let Some(batch) = &self.active {
            match batch.lookup(key.as_bytes()) {
                Overlay::Value(_) => return Ok(true),
                Overlay::Deleted => return Ok(false),
                Overlay::Untouched => {}
            }
        }
        Ok(self.engine.get(key.as_bytes())?.is_some())
    }

    /// Lazily decode every `(record_type, hash)` record in key order.
    ///
    /// Scans read the durable store only; writes pending in an open batch
    /// are not visible here.
    pub fn scan_prefix<'a, V: Decode<()> + 'a>(
        &'a self,
        record_type: &str,
    ) -> Result<impl Iterator<Item = Result<(Hash256, V), StoreError>> + 'a, StoreError> {
        Ok(self.raw_prefix(record_type)?.map(|item| {
            let (key, value) = item?;
            let (_, hash): (String, Hash256) = decode(&key)?;
            Ok((hash, decode(&value)?))
        }))
    }

    /// Number of `(record_type, _)` records, without decoding values.
    pub fn count_prefix(&self, record_type: &str) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for item in self.raw_prefix(record_type)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn raw_prefix<'a>(
        &'a self,
        record_type: &str,
    ) -> Result<impl Iterator<Item = Result<KvPair, StoreError>> + 'a, StoreError> {
        let prefix = encode(&record_type)?;
        let iter = self.engine.iter_from(&prefix);
        Ok(iter.take_while(move |item| match item {
            Ok((key, _)) => key.starts_with(&prefix),
            Err(_) => true,
        }))
    }

    /// Open a batch. Opening a second batch on the same handle is a bug.
    pub fn txn_begin(&mut self) {
        assert!(self.active.is_none(), "txn_begin with a batch already open");
        self.active = Some(WriteBatch::new());
    }

    pub fn in_txn(&self) -> bool {
        self.active.is_some()
    }

    /// Atomically apply the open batch.
    ///
    /// The batch is discarded whether or not the engine accepts it.
    pub fn txn_commit(&mut self) -> Result<(), StoreError> {
        let batch = self
            .active
            .take()
            .ok_or_else(|| StoreError::Commit("no open batch".into()))?;
        debug!(ops = batch.len(), "committing batch");
        self.engine.write(&batch).inspect_err(|e| {
            warn!(error = %e, ops = batch.len(), "batch commit failed");
        })
    }

    /// Drop the open batch without applying it.
    pub fn txn_abort(&mut self) {
        if let Some(batch) = self.active.take() {
            debug!(ops = batch.len(), "aborted batch");
        }
    }

    /// Destroy every record in the engine.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        self.active = None;
        self.engine.wipe()
    }

    /// Release the handle, discarding any uncommitted batch.
    pub fn close(mut self) -> E {
        if let Some(batch) = self.active.take() {
            warn!(ops = batch.len(), "closing store with an uncommitted batch");
        }
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore<MemoryEngine> {
        RecordStore::new(MemoryEngine::new())
    }

    fn key(n: u8) -> RecordKey {
        RecordKey::keyed("tx", &Hash256([n; 32])).unwrap()
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    #[test]
    fn keyed_records_share_type_prefix() {
        let prefix = RecordKey::singleton("blockindex").unwrap();
        let k = RecordKey::keyed("blockindex", &Hash256([7; 32])).unwrap();
        assert!(k.as_bytes().starts_with(prefix.as_bytes()));
        assert_eq!(k.as_bytes().len(), prefix.as_bytes().len() + 32);
    }

    // ------------------------------------------------------------------
    // Direct access
    // ------------------------------------------------------------------

    #[test]
    fn write_read_erase_without_batch() {
        let mut s = store();
        s.write(&key(1), &42u64).unwrap();
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), Some(42));
        assert!(s.exists(&key(1)).unwrap());
        s.erase(&key(1)).unwrap();
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), None);
        assert!(!s.exists(&key(1)).unwrap());
    }

    #[test]
    fn scan_prefix_returns_only_matching_type() {
        let mut s = store();
        for n in 1..=3 {
            s.write(&RecordKey::keyed("blockindex", &Hash256([n; 32])).unwrap(), &(n as u32))
                .unwrap();
        }
        s.write(&key(9), &0u32).unwrap();
        s.write(&RecordKey::singleton("version").unwrap(), &1u32)
            .unwrap();

        let found: Vec<(Hash256, u32)> = s
            .scan_prefix("blockindex")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&(Hash256([2; 32]), 2)));
        assert_eq!(s.count_prefix("blockindex").unwrap(), 3);
        assert_eq!(s.count_prefix("tx").unwrap(), 1);
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    #[test]
    fn reads_see_uncommitted_writes() {
        let mut s = store();
        s.write(&key(1), &1u64).unwrap();
        s.txn_begin();
        s.write(&key(1), &2u64).unwrap();
        s.write(&key(2), &3u64).unwrap();
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), Some(2));
        assert!(s.exists(&key(2)).unwrap());
        // Engine is untouched until commit.
        assert_eq!(s.engine().len(), 1);
        s.txn_commit().unwrap();
        assert_eq!(s.engine().len(), 2);
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), Some(2));
    }

    #[test]
    fn put_then_delete_hides_durable_value() {
        let mut s = store();
        s.write(&key(1), &1u64).unwrap();
        s.txn_begin();
        s.write(&key(1), &2u64).unwrap();
        s.erase(&key(1)).unwrap();
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), None);
        assert!(!s.exists(&key(1)).unwrap());
    }

    #[test]
    fn abort_discards_batch() {
        let mut s = store();
        s.txn_begin();
        s.write(&key(1), &1u64).unwrap();
        s.txn_abort();
        assert!(!s.in_txn());
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), None);
    }

    #[test]
    fn failed_commit_discards_batch() {
        let mut s = store();
        s.txn_begin();
        s.write(&key(1), &1u64).unwrap();
        s.engine().set_fail_writes(true);
        assert!(s.txn_commit().is_err());
        assert!(!s.in_txn());
        s.engine().set_fail_writes(false);
        assert_eq!(s.read::<u64>(&key(1)).unwrap(), None);
    }

    #[test]
    fn commit_without_batch_is_an_error() {
        let mut s = store();
        assert!(matches!(s.txn_commit(), Err(StoreError::Commit(_))));
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn nested_begin_panics() {
        let mut s = store();
        s.txn_begin();
        s.txn_begin();
    }

    #[test]
    fn close_returns_engine_without_pending_writes() {
        let mut s = store();
        s.txn_begin();
        s.write(&key(1), &1u64).unwrap();
        let engine = s.close();
        assert!(engine.is_empty());
    }
}
