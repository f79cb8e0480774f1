//! Move the best chain back to a verified fork candidate.

use tracing::{debug, info, warn};

use ember_core::error::EmberError;
use ember_core::shutdown::ShutdownFlag;
use ember_core::traits::BlockSource;
use ember_core::types::{Block, Hash256};

use crate::index::ChainIndex;
use crate::store::KeyValueEngine;
use crate::txdb::TxDb;

/// Makes a block the new best-chain tip.
///
/// `block` is the candidate's body, already read from disk.
pub trait ChainSelector<E: KeyValueEngine> {
    fn set_best_chain(
        &self,
        db: &mut TxDb<E>,
        index: &mut ChainIndex,
        block: &Block,
        candidate: Hash256,
    ) -> Result<(), EmberError>;
}

/// Disconnects every block above the candidate in one batch.
///
/// For each disconnected block, newest first: outputs its inputs spent are
/// marked unspent again, its transactions leave the tx index, and its
/// block index record loses the `next` link. The candidate's `next` link is
/// cleared and `"hashBestChain"` rewritten in the same batch. In-memory
/// state changes only after the batch commits.
pub struct RewindBestChain<'a> {
    source: &'a dyn BlockSource,
}

impl<'a> RewindBestChain<'a> {
    pub fn new(source: &'a dyn BlockSource) -> Self {
        Self { source }
    }

    fn rewind<E: KeyValueEngine>(
        &self,
        db: &mut TxDb<E>,
        index: &ChainIndex,
        disconnect: &[Hash256],
        candidate: Hash256,
    ) -> Result<(), EmberError> {
        for hash in disconnect {
            let node = index.node(hash)?;
            let block = self.source.read_block(node.file, node.block_pos)?;

            for tx in block.transactions.iter().rev() {
                let txid = tx.txid()?;
                for input in tx.inputs.iter().filter(|i| !i.prevout.is_null()) {
                    let prevout = input.prevout;
                    let Some(mut record) = db.read_tx_index(&prevout.hash)? else {
                        continue;
                    };
                    if let Some(slot) = record.spent.get_mut(prevout.index as usize) {
                        *slot = None;
                        db.update_tx_index(&prevout.hash, &record)?;
                    }
                }
                db.erase_tx_index(&txid)?;
            }

            let mut record = node.to_disk();
            record.hash_next = Hash256::ZERO;
            db.write_block_index(&record)?;
            debug!(height = node.height, %hash, "disconnected block");
        }

        let mut record = index.node(&candidate)?.to_disk();
        record.hash_next = Hash256::ZERO;
        db.write_block_index(&record)?;
        db.write_hash_best_chain(&candidate)?;
        Ok(())
    }
}

impl<E: KeyValueEngine> ChainSelector<E> for RewindBestChain<'_> {
    fn set_best_chain(
        &self,
        db: &mut TxDb<E>,
        index: &mut ChainIndex,
        block: &Block,
        candidate: Hash256,
    ) -> Result<(), EmberError> {
        if block.hash() != candidate {
            return Err(EmberError::ChainSelection(format!(
                "block body does not hash to candidate {candidate}"
            )));
        }
        let Some(best) = index.best else {
            return Err(EmberError::ChainSelection("no best chain to rewind".into()));
        };

        let mut disconnect = Vec::new();
        let mut found = false;
        for node in index.graph.ancestors(best.hash) {
            if node.hash == candidate {
                found = true;
                break;
            }
            disconnect.push(node.hash);
        }
        if !found {
            return Err(EmberError::ChainSelection(format!(
                "{candidate} is not an ancestor of the best chain"
            )));
        }

        db.txn_begin();
        if let Err(e) = self.rewind(db, index, &disconnect, candidate) {
            db.txn_abort();
            return Err(e);
        }
        db.txn_commit()?;

        for hash in disconnect.iter().chain(std::iter::once(&candidate)) {
            if let Some(node) = index.graph.get_mut(hash) {
                node.next = None;
            }
        }
        let best = index.set_best(candidate)?;
        info!(
            disconnected = disconnect.len(),
            height = best.height,
            hash = %best.hash,
            "best chain rewound"
        );
        Ok(())
    }
}

/// Hand the fork candidate to `selector` unless shutdown was requested.
///
/// Returns whether the best chain was moved. Failing to read the
/// candidate's block is fatal.
pub fn apply_fork_candidate<E: KeyValueEngine>(
    db: &mut TxDb<E>,
    index: &mut ChainIndex,
    source: &dyn BlockSource,
    selector: &dyn ChainSelector<E>,
    shutdown: &ShutdownFlag,
    candidate: Hash256,
) -> Result<bool, EmberError> {
    if shutdown.is_requested() {
        warn!(%candidate, "shutdown requested, leaving best chain in place");
        return Ok(false);
    }

    let node = index.node(&candidate)?;
    info!(
        height = node.height,
        "moving best chain pointer back to block {}",
        node.height
    );
    let block = source.read_block(node.file, node.block_pos)?;
    selector.set_best_chain(db, index, &block, candidate)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;
    use ember_core::error::ReadError;
    use ember_core::types::{BlockHeader, DiskBlockIndex, DiskTxPos, Transaction};
    use std::cell::Cell;

    struct EmptyBlocks;

    impl BlockSource for EmptyBlocks {
        fn read_block(&self, _file: u32, _block_pos: u32) -> Result<Block, ReadError> {
            Ok(Block {
                header: BlockHeader {
                    version: 1,
                    prev_hash: Hash256::ZERO,
                    merkle_root: Hash256::ZERO,
                    time: 0,
                    bits: 0,
                    nonce: 0,
                },
                transactions: Vec::new(),
                signature: Vec::new(),
            })
        }

        fn read_transaction(&self, pos: &DiskTxPos) -> Result<Transaction, ReadError> {
            Err(ReadError::Transaction {
                file: pos.file,
                offset: pos.tx_pos,
                reason: "unused".into(),
            })
        }
    }

    struct CountingSelector {
        calls: Cell<u32>,
    }

    impl ChainSelector<MemoryEngine> for CountingSelector {
        fn set_best_chain(
            &self,
            _db: &mut TxDb<MemoryEngine>,
            _index: &mut ChainIndex,
            _block: &Block,
            _candidate: Hash256,
        ) -> Result<(), EmberError> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    fn h(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    fn small_index() -> ChainIndex {
        let mut index = ChainIndex::new(h(1));
        index.insert_record(h(1), &DiskBlockIndex::default());
        index.insert_record(
            h(2),
            &DiskBlockIndex {
                hash_prev: h(1),
                height: 1,
                ..DiskBlockIndex::default()
            },
        );
        index.set_best(h(2)).unwrap();
        index
    }

    #[test]
    fn shutdown_skips_the_selector() {
        let mut db = TxDb::open(MemoryEngine::new(), true).unwrap().0;
        let mut index = small_index();
        let selector = CountingSelector { calls: Cell::new(0) };
        let shutdown = ShutdownFlag::new();
        shutdown.request();

        let moved =
            apply_fork_candidate(&mut db, &mut index, &EmptyBlocks, &selector, &shutdown, h(1))
                .unwrap();
        assert!(!moved);
        assert_eq!(selector.calls.get(), 0);
    }

    #[test]
    fn candidate_is_handed_to_selector() {
        let mut db = TxDb::open(MemoryEngine::new(), true).unwrap().0;
        let mut index = small_index();
        let selector = CountingSelector { calls: Cell::new(0) };

        let moved = apply_fork_candidate(
            &mut db,
            &mut index,
            &EmptyBlocks,
            &selector,
            &ShutdownFlag::new(),
            h(1),
        )
        .unwrap();
        assert!(moved);
        assert_eq!(selector.calls.get(), 1);
    }

    #[test]
    fn rewind_rejects_mismatched_body() {
        let mut db = TxDb::open(MemoryEngine::new(), true).unwrap().0;
        let mut index = small_index();
        let block = EmptyBlocks.read_block(0, 0).unwrap();
        let err = RewindBestChain::new(&EmptyBlocks)
            .set_best_chain(&mut db, &mut index, &block, h(1))
            .unwrap_err();
        assert!(matches!(err, EmberError::ChainSelection(_)));
        assert_eq!(index.best.unwrap().hash, h(2));
    }
}
