//! Typed access to the transaction database.
//!
//! Layout, all in one key namespace:
//!
//! | Key | Value |
//! |---|---|
//! | `("tx", txid)` | [`TxIndexRecord`] |
//! | `("blockindex", hash)` | [`DiskBlockIndex`] |
//! | `"hashBestChain"` | [`Hash256`] |
//! | `"bnBestInvalidTrust"` | [`ChainTrust`] |
//! | `"hashSyncCheckpoint"` | [`Hash256`] |
//! | `"strCheckpointPubKey"` | `String` |
//! | `"version"` | `u32` |

use tracing::{info, warn};

use ember_core::constants::DATABASE_VERSION;
use ember_core::error::{EmberError, StoreError};
use ember_core::traits::BlockSource;
use ember_core::types::{ChainTrust, DiskBlockIndex, DiskTxPos, Hash256, OutPoint, Transaction, TxIndexRecord};

use crate::store::{KeyValueEngine, RecordKey, RecordStore};

pub const TX_PREFIX: &str = "tx";
pub const BLOCK_INDEX_PREFIX: &str = "blockindex";
const KEY_BEST_CHAIN: &str = "hashBestChain";
const KEY_BEST_INVALID_TRUST: &str = "bnBestInvalidTrust";
const KEY_SYNC_CHECKPOINT: &str = "hashSyncCheckpoint";
const KEY_CHECKPOINT_PUBKEY: &str = "strCheckpointPubKey";
const KEY_VERSION: &str = "version";

/// Schema state found when the database was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaStatus {
    /// The stored version is current.
    Current,
    /// The database was empty; the current version was written.
    Created,
    /// An older schema was wiped. Block files must be discarded too.
    Rebuilt { previous: u32 },
}

pub struct TxDb<E> {
    store: RecordStore<E>,
}

impl<E: KeyValueEngine> TxDb<E> {
    /// Wrap `engine`, checking the schema version.
    ///
    /// A store older than [`DATABASE_VERSION`] is wiped when `migrate` is
    /// set and rejected with [`EmberError::SchemaVersionMismatch`] otherwise.
    pub fn open(engine: E, migrate: bool) -> Result<(Self, SchemaStatus), EmberError> {
        let mut db = Self {
            store: RecordStore::new(engine),
        };

        let status = match db.read_version()? {
            Some(found) if found >= DATABASE_VERSION => {
                info!(version = found, "transaction index version");
                SchemaStatus::Current
            }
            Some(found) => {
                if !migrate {
                    return Err(EmberError::SchemaVersionMismatch {
                        found,
                        required: DATABASE_VERSION,
                    });
                }
                warn!(
                    found,
                    required = DATABASE_VERSION,
                    "transaction index is outdated, removing old database"
                );
                db.store.wipe()?;
                db.write_version(DATABASE_VERSION)?;
                SchemaStatus::Rebuilt { previous: found }
            }
            None => {
                db.write_version(DATABASE_VERSION)?;
                SchemaStatus::Created
            }
        };

        Ok((db, status))
    }

    pub fn store(&self) -> &RecordStore<E> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RecordStore<E> {
        &mut self.store
    }

    pub fn txn_begin(&mut self) {
        self.store.txn_begin();
    }

    pub fn txn_commit(&mut self) -> Result<(), StoreError> {
        self.store.txn_commit()
    }

    pub fn txn_abort(&mut self) {
        self.store.txn_abort();
    }

    pub fn close(self) -> E {
        self.store.close()
    }

    // --- Transaction index ---

    pub fn read_tx_index(&self, txid: &Hash256) -> Result<Option<TxIndexRecord>, StoreError> {
        self.store.read(&RecordKey::keyed(TX_PREFIX, txid)?)
    }

    pub fn update_tx_index(&mut self, txid: &Hash256, record: &TxIndexRecord) -> Result<(), StoreError> {
        self.store.write(&RecordKey::keyed(TX_PREFIX, txid)?, record)
    }

    /// Index `tx` at `pos` with every output unspent.
    pub fn add_tx_index(&mut self, tx: &Transaction, pos: DiskTxPos) -> Result<Hash256, EmberError> {
        let txid = tx.txid()?;
        let record = TxIndexRecord::new(pos, tx.outputs.len());
        self.update_tx_index(&txid, &record)?;
        Ok(txid)
    }

    pub fn erase_tx_index(&mut self, txid: &Hash256) -> Result<(), StoreError> {
        self.store.erase(&RecordKey::keyed(TX_PREFIX, txid)?)
    }

    pub fn contains_tx(&self, txid: &Hash256) -> Result<bool, StoreError> {
        self.store.exists(&RecordKey::keyed(TX_PREFIX, txid)?)
    }

    /// Look up `txid` and read the transaction from its indexed position.
    pub fn read_disk_tx(
        &self,
        txid: &Hash256,
        source: &dyn BlockSource,
    ) -> Result<Option<(Transaction, TxIndexRecord)>, EmberError> {
        let Some(record) = self.read_tx_index(txid)? else {
            return Ok(None);
        };
        let tx = source.read_transaction(&record.pos)?;
        Ok(Some((tx, record)))
    }

    /// [`read_disk_tx`](Self::read_disk_tx) for the transaction an outpoint refers to.
    pub fn read_disk_tx_for(
        &self,
        outpoint: &OutPoint,
        source: &dyn BlockSource,
    ) -> Result<Option<(Transaction, TxIndexRecord)>, EmberError> {
        self.read_disk_tx(&outpoint.hash, source)
    }

    // --- Block index ---

    pub fn write_block_index(&mut self, record: &DiskBlockIndex) -> Result<(), StoreError> {
        let hash = record.block_hash();
        self.store.write(&RecordKey::keyed(BLOCK_INDEX_PREFIX, &hash)?, record)
    }

    pub fn read_block_index(&self, hash: &Hash256) -> Result<Option<DiskBlockIndex>, StoreError> {
        self.store.read(&RecordKey::keyed(BLOCK_INDEX_PREFIX, hash)?)
    }

    // --- Singletons ---

    pub fn read_hash_best_chain(&self) -> Result<Option<Hash256>, StoreError> {
        self.store.read(&RecordKey::singleton(KEY_BEST_CHAIN)?)
    }

    pub fn write_hash_best_chain(&mut self, hash: &Hash256) -> Result<(), StoreError> {
        self.store.write(&RecordKey::singleton(KEY_BEST_CHAIN)?, hash)
    }

    pub fn read_best_invalid_trust(&self) -> Result<Option<ChainTrust>, StoreError> {
        self.store.read(&RecordKey::singleton(KEY_BEST_INVALID_TRUST)?)
    }

    pub fn write_best_invalid_trust(&mut self, trust: &ChainTrust) -> Result<(), StoreError> {
        self.store.write(&RecordKey::singleton(KEY_BEST_INVALID_TRUST)?, trust)
    }

    pub fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StoreError> {
        self.store.read(&RecordKey::singleton(KEY_SYNC_CHECKPOINT)?)
    }

    pub fn write_sync_checkpoint(&mut self, hash: &Hash256) -> Result<(), StoreError> {
        self.store.write(&RecordKey::singleton(KEY_SYNC_CHECKPOINT)?, hash)
    }

    pub fn read_checkpoint_pubkey(&self) -> Result<Option<String>, StoreError> {
        self.store.read(&RecordKey::singleton(KEY_CHECKPOINT_PUBKEY)?)
    }

    pub fn write_checkpoint_pubkey(&mut self, pubkey: &str) -> Result<(), StoreError> {
        self.store.write(&RecordKey::singleton(KEY_CHECKPOINT_PUBKEY)?, &pubkey)
    }

    pub fn read_version(&self) -> Result<Option<u32>, StoreError> {
        self.store.read(&RecordKey::singleton(KEY_VERSION)?)
    }

    pub fn write_version(&mut self, version: u32) -> Result<(), StoreError> {
        self.store.write(&RecordKey::singleton(KEY_VERSION)?, &version)
    }
}
