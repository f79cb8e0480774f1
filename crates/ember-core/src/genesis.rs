//! Compiled-in regression-test genesis block.
//!
//! Mainnet and testnet pin their genesis hashes as constants. Regtest
//! derives its hash from the block below, so every node builds the
//! identical genesis and a fresh regtest store can still be told apart
//! from an empty one.

use std::sync::LazyLock;

use crate::merkle;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};

/// Regtest genesis timestamp: January 1, 2026 00:00:00 UTC.
pub const REGTEST_GENESIS_TIME: u32 = 1_767_225_600;

/// Easiest compact target; regtest blocks are never mined against it.
pub const REGTEST_GENESIS_BITS: u32 = 0x207f_ffff;

/// Message carried in the genesis coinbase.
pub const REGTEST_GENESIS_MESSAGE: &[u8] = b"Ember regtest genesis";

struct Genesis {
    block: Block,
    hash: Hash256,
}

static REGTEST: LazyLock<Genesis> = LazyLock::new(build_regtest_genesis);

fn build_regtest_genesis() -> Genesis {
    let coinbase = Transaction {
        version: 1,
        time: REGTEST_GENESIS_TIME,
        inputs: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: REGTEST_GENESIS_MESSAGE.to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: 0,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    };
    // Hardcoded coinbase, serialization cannot fail.
    let txid = coinbase
        .txid()
        .expect("regtest genesis coinbase is hardcoded valid data");

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: merkle::merkle_root(&[txid]),
            time: REGTEST_GENESIS_TIME,
            bits: REGTEST_GENESIS_BITS,
            nonce: 0,
        },
        transactions: vec![coinbase],
        signature: Vec::new(),
    };
    let hash = block.hash();
    Genesis { block, hash }
}

/// The regtest genesis block.
pub fn regtest_genesis_block() -> &'static Block {
    &REGTEST.block
}

pub fn regtest_genesis_hash() -> Hash256 {
    REGTEST.hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BlockValidator;
    use crate::validation::BasicValidator;

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(build_regtest_genesis().hash, regtest_genesis_hash());
        assert!(!regtest_genesis_hash().is_zero());
    }

    #[test]
    fn genesis_is_structurally_valid() {
        let block = regtest_genesis_block();
        assert_eq!(block.header.prev_hash, Hash256::ZERO);
        assert_eq!(block.hash(), regtest_genesis_hash());
        assert!(BasicValidator.check_block(block, true).is_ok());
    }
}
