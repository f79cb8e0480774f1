//! Collaborator interfaces consumed by the block index.
//!
//! - [`BlockTrust`]: per-block trust contribution (difficulty or stake weight)
//! - [`BlockValidator`]: structural block and transaction checks
//! - [`BlockSource`]: positional reads of raw blocks and transactions
//!
//! Default implementations live in [`crate::validation`] and in the block
//! file store of `ember-index`.

use crate::block_index::BlockIndexNode;
use crate::error::{BlockError, ReadError, TransactionError};
use crate::types::{Block, ChainTrust, DiskTxPos, Transaction};

/// Trust contributed by a single block.
pub trait BlockTrust: Send + Sync {
    fn block_trust(&self, node: &BlockIndexNode) -> ChainTrust;
}

/// Context-free structural validation.
pub trait BlockValidator: Send + Sync {
    /// Validate block structure. Signature presence is only checked when
    /// `check_signatures` is set.
    fn check_block(&self, block: &Block, check_signatures: bool) -> Result<(), BlockError>;

    fn check_transaction(&self, tx: &Transaction) -> Result<(), TransactionError>;
}

/// Byte-level reads of blocks and transactions by recorded position.
pub trait BlockSource: Send + Sync {
    /// Read the full block stored at `block_pos` in block file `file`.
    fn read_block(&self, file: u32, block_pos: u32) -> Result<Block, ReadError>;

    /// Read the single transaction at `pos.tx_pos`.
    fn read_transaction(&self, pos: &DiskTxPos) -> Result<Transaction, ReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHeader, Hash256};
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Mock: BlockSource
    // ------------------------------------------------------------------

    struct MockSource {
        blocks: HashMap<(u32, u32), Block>,
    }

    impl BlockSource for MockSource {
        fn read_block(&self, file: u32, block_pos: u32) -> Result<Block, ReadError> {
            self.blocks
                .get(&(file, block_pos))
                .cloned()
                .ok_or_else(|| ReadError::Block {
                    file,
                    offset: block_pos,
                    reason: "missing".into(),
                })
        }

        fn read_transaction(&self, pos: &DiskTxPos) -> Result<Transaction, ReadError> {
            let block = self.read_block(pos.file, pos.block_pos)?;
            block
                .transactions
                .get(pos.tx_pos as usize)
                .cloned()
                .ok_or_else(|| ReadError::Transaction {
                    file: pos.file,
                    offset: pos.tx_pos,
                    reason: "out of range".into(),
                })
        }
    }

    struct FlatTrust;

    impl BlockTrust for FlatTrust {
        fn block_trust(&self, node: &BlockIndexNode) -> ChainTrust {
            ChainTrust(node.height as u128 + 1)
        }
    }

    fn empty_block() -> Block {
        Block {
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
        }
    }

    #[test]
    fn source_reports_position_on_miss() {
        let source = MockSource {
            blocks: HashMap::new(),
        };
        let err = source.read_block(3, 99).unwrap_err();
        assert_eq!(
            err,
            ReadError::Block {
                file: 3,
                offset: 99,
                reason: "missing".into()
            }
        );
    }

    #[test]
    fn source_trait_objects_are_usable() {
        let mut blocks = HashMap::new();
        blocks.insert((1, 0), empty_block());
        let source: Box<dyn BlockSource> = Box::new(MockSource { blocks });
        assert!(source.read_block(1, 0).is_ok());
        assert!(source.read_transaction(&DiskTxPos::new(1, 0, 0)).is_err());
    }

    #[test]
    fn trust_trait_object() {
        let trust: &dyn BlockTrust = &FlatTrust;
        let mut node = BlockIndexNode::placeholder(Hash256([1; 32]));
        node.height = 4;
        assert_eq!(trust.block_trust(&node), ChainTrust(5));
    }
}
