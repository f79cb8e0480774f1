//! Shared helpers for building on-disk test chains.

use std::collections::HashSet;

use tempfile::TempDir;

use ember_core::block_index::BlockIndexNode;
use ember_core::checkpoint::{ChainParams, Checkpoints};
use ember_core::constants::NetworkType;
use ember_core::error::{BlockError, TransactionError};
use ember_core::genesis::regtest_genesis_block;
use ember_core::merkle;
use ember_core::traits::{BlockTrust, BlockValidator};
use ember_core::types::*;
use ember_core::validation::BasicValidator;
use ember_index::store::MemoryEngine;
use ember_index::{FlatBlockFiles, TxDb};

/// Compact bits used for every test block.
pub const TEST_BITS: u32 = 0x1d00_ffff;

/// Every block contributes one unit of trust.
pub struct UnitTrust;

impl BlockTrust for UnitTrust {
    fn block_trust(&self, _node: &BlockIndexNode) -> ChainTrust {
        ChainTrust(1)
    }
}

/// [`BasicValidator`] that additionally rejects chosen blocks.
#[derive(Default)]
pub struct RejectingValidator {
    pub reject: HashSet<Hash256>,
}

impl RejectingValidator {
    pub fn rejecting(hashes: impl IntoIterator<Item = Hash256>) -> Self {
        Self {
            reject: hashes.into_iter().collect(),
        }
    }
}

impl BlockValidator for RejectingValidator {
    fn check_block(&self, block: &Block, check_signatures: bool) -> Result<(), BlockError> {
        let hash = block.hash();
        if self.reject.contains(&hash) {
            return Err(BlockError::Rejected(hash.to_string()));
        }
        BasicValidator.check_block(block, check_signatures)
    }

    fn check_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        BasicValidator.check_transaction(tx)
    }
}

/// Coinbase paying 50 units, made unique by the height in its script.
pub fn make_coinbase(height: u64) -> Transaction {
    Transaction {
        version: 1,
        time: height as u32,
        inputs: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: 50,
            script_pubkey: vec![height as u8],
        }],
        lock_time: 0,
    }
}

/// A transaction spending `prevouts` into a single output.
pub fn make_spend(prevouts: &[OutPoint], value: u64) -> Transaction {
    Transaction {
        version: 1,
        time: 0,
        inputs: prevouts
            .iter()
            .map(|prevout| TxIn {
                prevout: *prevout,
                script_sig: vec![0; 8],
                sequence: u32::MAX,
            })
            .collect(),
        outputs: vec![TxOut {
            value,
            script_pubkey: vec![0xAB],
        }],
        lock_time: 0,
    }
}

/// A coinstake spending `prevout`: empty first output, stake returned in the second.
pub fn make_coinstake(prevout: OutPoint, value: u64) -> Transaction {
    Transaction {
        version: 1,
        time: 0,
        inputs: vec![TxIn {
            prevout,
            script_sig: vec![0; 8],
            sequence: u32::MAX,
        }],
        outputs: vec![
            TxOut {
                value: 0,
                script_pubkey: Vec::new(),
            },
            TxOut {
                value,
                script_pubkey: vec![0xCD],
            },
        ],
        lock_time: 0,
    }
}

/// Block on `prev_hash` with a correct merkle root.
pub fn make_block(prev_hash: Hash256, height: u64, txs: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle::merkle_root(&txids),
            time: 1_700_000_000 + height as u32 * 600,
            bits: TEST_BITS,
            nonce: height as u32,
        },
        transactions: txs,
        signature: Vec::new(),
    }
}

/// A best chain written to block files and an in-memory transaction database.
///
/// Blocks are connected the way a node would: each transaction is indexed,
/// the outputs its inputs spend are marked, and the parent's `next` link
/// and `"hashBestChain"` move to the new tip, all in one batch.
pub struct TestChain {
    pub dir: TempDir,
    pub files: FlatBlockFiles,
    pub db: TxDb<MemoryEngine>,
    /// Block hashes by height.
    pub hashes: Vec<Hash256>,
    pub blocks: Vec<Block>,
    records: Vec<DiskBlockIndex>,
}

impl TestChain {
    fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let files = FlatBlockFiles::open(dir.path()).unwrap();
        let db = TxDb::open(MemoryEngine::new(), true).unwrap().0;
        Self {
            dir,
            files,
            db,
            hashes: Vec::new(),
            blocks: Vec::new(),
            records: Vec::new(),
        }
    }

    /// A chain holding only its genesis block.
    pub fn new() -> Self {
        let mut chain = Self::empty();
        chain.extend(Vec::new());
        chain
    }

    /// A chain rooted at the compiled-in regtest genesis block.
    pub fn regtest() -> Self {
        let mut chain = Self::empty();
        chain.connect(regtest_genesis_block().clone());
        chain
    }

    /// Genesis plus `len` further blocks with coinbase only.
    pub fn with_length(len: u64) -> Self {
        let mut chain = Self::new();
        for _ in 0..len {
            chain.extend(Vec::new());
        }
        chain
    }

    pub fn genesis(&self) -> Hash256 {
        self.hashes[0]
    }

    pub fn height(&self) -> u64 {
        self.hashes.len() as u64 - 1
    }

    pub fn tip(&self) -> Hash256 {
        *self.hashes.last().unwrap()
    }

    /// Regtest parameters rooted at this chain's genesis.
    pub fn params(&self) -> ChainParams {
        self.params_with(Checkpoints::default())
    }

    pub fn params_with(&self, checkpoints: Checkpoints) -> ChainParams {
        ChainParams::new(NetworkType::Regtest, self.genesis(), checkpoints)
    }

    /// Output 0 of the coinbase at `height`.
    pub fn coinbase_outpoint(&self, height: u64) -> OutPoint {
        let txid = self.blocks[height as usize].transactions[0].txid().unwrap();
        OutPoint::new(txid, 0)
    }

    /// Append and connect a block carrying a coinbase followed by `txs`.
    pub fn extend(&mut self, txs: Vec<Transaction>) -> Hash256 {
        let height = self.hashes.len() as u64;
        let prev = self.hashes.last().copied().unwrap_or(Hash256::ZERO);
        let mut all = vec![make_coinbase(height)];
        all.extend(txs);
        self.connect(make_block(prev, height, all))
    }

    /// Append `block` on the current tip and connect it.
    pub fn connect(&mut self, block: Block) -> Hash256 {
        let height = self.hashes.len() as u64;
        let prev = block.header.prev_hash;
        let hash = block.hash();
        let location = self.files.append_block(&block).unwrap();

        self.db.txn_begin();
        for (tx, pos) in block.transactions.iter().zip(&location.tx_positions) {
            for input in tx.inputs.iter().filter(|i| !i.prevout.is_null()) {
                let mut record = self.db.read_tx_index(&input.prevout.hash).unwrap().unwrap();
                record.spent[input.prevout.index as usize] = Some(*pos);
                self.db.update_tx_index(&input.prevout.hash, &record).unwrap();
            }
            self.db.add_tx_index(tx, *pos).unwrap();
        }

        let record = DiskBlockIndex {
            hash_prev: prev,
            file: location.file,
            block_pos: location.block_pos,
            height,
            version: block.header.version,
            merkle_root: block.header.merkle_root,
            time: block.header.time,
            bits: block.header.bits,
            nonce: block.header.nonce,
            ..DiskBlockIndex::default()
        };
        assert_eq!(record.block_hash(), hash);
        if let Some(parent) = self.records.last_mut() {
            parent.hash_next = hash;
            self.db.write_block_index(parent).unwrap();
        }
        self.db.write_block_index(&record).unwrap();
        self.db.write_hash_best_chain(&hash).unwrap();
        self.db.txn_commit().unwrap();

        self.hashes.push(hash);
        self.blocks.push(block);
        self.records.push(record);
        hash
    }

    /// Clear the spent marker of `outpoint` without touching anything else.
    pub fn unmark_spent(&mut self, outpoint: OutPoint) {
        let mut record = self.db.read_tx_index(&outpoint.hash).unwrap().unwrap();
        record.spent[outpoint.index as usize] = None;
        self.db.update_tx_index(&outpoint.hash, &record).unwrap();
    }

    /// Overwrite the spent marker of `outpoint`.
    pub fn mark_spent(&mut self, outpoint: OutPoint, spender: DiskTxPos) {
        let mut record = self.db.read_tx_index(&outpoint.hash).unwrap().unwrap();
        record.spent[outpoint.index as usize] = Some(spender);
        self.db.update_tx_index(&outpoint.hash, &record).unwrap();
    }

    /// Position of transaction `index` in the block at `height`.
    pub fn tx_pos(&self, height: u64, index: usize) -> DiskTxPos {
        let txid = self.blocks[height as usize].transactions[index].txid().unwrap();
        self.db.read_tx_index(&txid).unwrap().unwrap().pos
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}
