//! RocksDB-backed engine.
//!
//! A single default column family holds every record; keys carry their
//! record type as an encoded prefix. Batches are written with `sync` so a
//! committed transaction survives a crash.

use std::path::{Path, PathBuf};

use rocksdb::{BlockBasedOptions, Cache, Direction, IteratorMode, Options, WriteOptions, DB};
use tracing::info;

use ember_core::error::StoreError;

use super::batch::{BatchOp, WriteBatch};
use super::{KeyValueEngine, KvIter};

/// Bits per key for the table bloom filter.
const BLOOM_BITS_PER_KEY: f64 = 10.0;

pub struct RocksEngine {
    db: Option<DB>,
    path: PathBuf,
    opts: Options,
}

impl RocksEngine {
    /// Open or create a database at `path` with an LRU block cache of
    /// `cache_mb` MiB.
    pub fn open(path: impl AsRef<Path>, cache_mb: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let opts = Self::options(cache_mb);
        let db = DB::open(&opts, &path).map_err(|e| StoreError::Engine(e.to_string()))?;
        info!(path = %path.display(), cache_mb, "opened transaction database");
        Ok(Self {
            db: Some(db),
            path,
            opts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn options(cache_mb: usize) -> Options {
        let cache = Cache::new_lru_cache(cache_mb.max(1) * 1024 * 1024);
        let mut table = BlockBasedOptions::default();
        table.set_block_cache(&cache);
        table.set_bloom_filter(BLOOM_BITS_PER_KEY, false);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_block_based_table_factory(&table);
        opts
    }

    fn db(&self) -> Result<&DB, StoreError> {
        self.db
            .as_ref()
            .ok_or_else(|| StoreError::Engine("database is closed".into()))
    }
}

impl KeyValueEngine for RocksEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db()?
            .get(key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db()?
            .put(key, value)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db()?
            .delete(key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn iter_from<'a>(&'a self, start: &[u8]) -> KvIter<'a> {
        let db = match self.db() {
            Ok(db) => db,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let iter = db
            .iterator(IteratorMode::From(start, Direction::Forward))
            .map(|item| {
                item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                    .map_err(|e| StoreError::Engine(e.to_string()))
            });
        Box::new(iter)
    }

    fn write(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.iter() {
            match op {
                BatchOp::Put { key, value } => rocks_batch.put(key, value),
                BatchOp::Delete { key } => rocks_batch.delete(key),
            }
        }
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db()?
            .write_opt(rocks_batch, &write_opts)
            .map_err(|e| StoreError::Commit(e.to_string()))
    }

    fn wipe(&mut self) -> Result<(), StoreError> {
        // Close before destroying; RocksDB holds a lock on the directory.
        drop(self.db.take());
        DB::destroy(&self.opts, &self.path).map_err(|e| StoreError::Engine(e.to_string()))?;
        let db =
            DB::open(&self.opts, &self.path).map_err(|e| StoreError::Engine(e.to_string()))?;
        self.db = Some(db);
        info!(path = %self.path.display(), "wiped transaction database");
        Ok(())
    }
}
