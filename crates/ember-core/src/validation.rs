//! Default collaborators: structural validation and compact-target trust.
//!
//! [`BasicValidator`] performs the context-free checks the chain verifier
//! runs at level 1 and level 6. It never touches chain state.

use std::collections::HashSet;

use crate::block_index::BlockIndexNode;
use crate::error::{BlockError, TransactionError};
use crate::merkle;
use crate::traits::{BlockTrust, BlockValidator};
use crate::types::{Block, ChainTrust, Transaction};

/// Maximum coinbase script size in bytes.
pub const MAX_COINBASE_SCRIPT: usize = 100;

/// Context-free structural validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicValidator;

impl BlockValidator for BasicValidator {
    /// Checks:
    /// - At least one transaction
    /// - First transaction is coinbase, no others are
    /// - All transactions pass [`check_transaction`](Self::check_transaction)
    /// - Merkle root in header matches the computed root
    /// - Proof-of-stake blocks carry a signature (when `check_signatures`)
    fn check_block(&self, block: &Block, check_signatures: bool) -> Result<(), BlockError> {
        if block.transactions.is_empty() {
            return Err(BlockError::NoTransactions);
        }

        if !block.transactions[0].is_coinbase() {
            return Err(BlockError::FirstTxNotCoinbase);
        }

        let mut txids = Vec::with_capacity(block.transactions.len());
        for (index, tx) in block.transactions.iter().enumerate() {
            if index > 0 && tx.is_coinbase() {
                return Err(BlockError::MultipleCoinbase);
            }
            self.check_transaction(tx)
                .map_err(|source| BlockError::Transaction { index, source })?;
            let txid = tx
                .txid()
                .map_err(|source| BlockError::Transaction { index, source })?;
            txids.push(txid);
        }

        if block.header.merkle_root != merkle::merkle_root(&txids) {
            return Err(BlockError::InvalidMerkleRoot);
        }

        if check_signatures && block.is_proof_of_stake() && block.signature.is_empty() {
            return Err(BlockError::MissingSignature);
        }

        Ok(())
    }

    fn check_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(TransactionError::EmptyInputsOrOutputs);
        }

        if tx.total_output_value().is_none() {
            return Err(TransactionError::ValueOverflow);
        }

        if tx.is_coinbase() {
            let len = tx.inputs[0].script_sig.len();
            if len > MAX_COINBASE_SCRIPT {
                return Err(TransactionError::InvalidCoinbase(format!(
                    "script too large: {len} > {MAX_COINBASE_SCRIPT}"
                )));
            }
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.prevout.is_null() {
                return Err(TransactionError::NullPrevout(i));
            }
            if !seen.insert(input.prevout) {
                return Err(TransactionError::DuplicateInput(input.prevout.to_string()));
            }
        }

        Ok(())
    }
}

/// Block trust derived from the compact difficulty target in `bits`.
///
/// Trust is `u128::MAX / (hi + 1)` where `hi` is the upper 128 bits of the
/// 256-bit target. A zero or negative target contributes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompactTargetTrust;

impl CompactTargetTrust {
    /// Upper 128 bits of the target encoded by `bits`, or `None` if the
    /// encoding is zero or negative.
    pub fn target_high(bits: u32) -> Option<u128> {
        let exponent = bits >> 24;
        let mantissa = bits & 0x007f_ffff;
        if mantissa == 0 || bits & 0x0080_0000 != 0 {
            return None;
        }

        let mantissa = mantissa as u128;
        if exponent <= 3 {
            // Whole target fits in the low bits.
            return Some(0);
        }

        let shift = 8 * (exponent - 3);
        if shift < 128 {
            return Some(mantissa >> (128 - shift));
        }
        let up = shift - 128;
        if up >= mantissa.leading_zeros() {
            return Some(u128::MAX);
        }
        Some(mantissa << up)
    }
}

impl BlockTrust for CompactTargetTrust {
    fn block_trust(&self, node: &BlockIndexNode) -> ChainTrust {
        match Self::target_high(node.bits) {
            Some(hi) => ChainTrust(u128::MAX / hi.saturating_add(1)),
            None => ChainTrust::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHeader, Hash256, OutPoint, TxIn, TxOut};

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            time: 0,
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![tag, 0x01],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 50,
                script_pubkey: vec![0xAA],
            }],
            lock_time: 0,
        }
    }

    fn spend(prevouts: &[OutPoint]) -> Transaction {
        Transaction {
            version: 1,
            time: 0,
            inputs: prevouts
                .iter()
                .map(|p| TxIn {
                    prevout: *p,
                    script_sig: vec![],
                    sequence: u32::MAX,
                })
                .collect(),
            outputs: vec![TxOut {
                value: 10,
                script_pubkey: vec![0xBB],
            }],
            lock_time: 0,
        }
    }

    fn block_of(txs: Vec<Transaction>) -> Block {
        let txids: Vec<Hash256> = txs.iter().map(|t| t.txid().unwrap()).collect();
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: merkle::merkle_root(&txids),
                time: 0,
                bits: 0x1d00ffff,
                nonce: 0,
            },
            transactions: txs,
            signature: vec![],
        }
    }

    fn node_with_bits(bits: u32) -> BlockIndexNode {
        BlockIndexNode {
            bits,
            ..BlockIndexNode::placeholder(Hash256([1; 32]))
        }
    }

    // ------------------------------------------------------------------
    // check_block
    // ------------------------------------------------------------------

    #[test]
    fn accepts_coinbase_only_block() {
        assert!(BasicValidator.check_block(&block_of(vec![coinbase(1)]), true).is_ok());
    }

    #[test]
    fn rejects_empty_block() {
        let mut block = block_of(vec![coinbase(1)]);
        block.transactions.clear();
        assert_eq!(
            BasicValidator.check_block(&block, false),
            Err(BlockError::NoTransactions)
        );
    }

    #[test]
    fn rejects_first_tx_not_coinbase() {
        let block = block_of(vec![spend(&[OutPoint::new(Hash256([2; 32]), 0)])]);
        assert_eq!(
            BasicValidator.check_block(&block, false),
            Err(BlockError::FirstTxNotCoinbase)
        );
    }

    #[test]
    fn rejects_second_coinbase() {
        let block = block_of(vec![coinbase(1), coinbase(2)]);
        assert_eq!(
            BasicValidator.check_block(&block, false),
            Err(BlockError::MultipleCoinbase)
        );
    }

    #[test]
    fn rejects_wrong_merkle_root() {
        let mut block = block_of(vec![coinbase(1)]);
        block.header.merkle_root = Hash256([9; 32]);
        assert_eq!(
            BasicValidator.check_block(&block, false),
            Err(BlockError::InvalidMerkleRoot)
        );
    }

    #[test]
    fn wraps_transaction_errors_with_index() {
        let p = OutPoint::new(Hash256([2; 32]), 0);
        let block = block_of(vec![coinbase(1), spend(&[p, p])]);
        assert!(matches!(
            BasicValidator.check_block(&block, false),
            Err(BlockError::Transaction { index: 1, .. })
        ));
    }

    #[test]
    fn stake_block_needs_signature_only_when_checked() {
        let stake = Transaction {
            version: 1,
            time: 5,
            inputs: vec![TxIn {
                prevout: OutPoint::new(Hash256([3; 32]), 1),
                script_sig: vec![],
                sequence: u32::MAX,
            }],
            outputs: vec![
                TxOut {
                    value: 0,
                    script_pubkey: vec![],
                },
                TxOut {
                    value: 60,
                    script_pubkey: vec![0xCC],
                },
            ],
            lock_time: 0,
        };
        let block = block_of(vec![coinbase(1), stake]);
        assert!(block.is_proof_of_stake());
        assert!(BasicValidator.check_block(&block, false).is_ok());
        assert_eq!(
            BasicValidator.check_block(&block, true),
            Err(BlockError::MissingSignature)
        );
    }

    // ------------------------------------------------------------------
    // check_transaction
    // ------------------------------------------------------------------

    #[test]
    fn rejects_null_prevout_in_regular_tx() {
        let mut tx = spend(&[OutPoint::new(Hash256([2; 32]), 0)]);
        tx.inputs.push(TxIn {
            prevout: OutPoint::null(),
            script_sig: vec![],
            sequence: 0,
        });
        assert_eq!(
            BasicValidator.check_transaction(&tx),
            Err(TransactionError::NullPrevout(1))
        );
    }

    #[test]
    fn rejects_oversized_coinbase_script() {
        let mut tx = coinbase(1);
        tx.inputs[0].script_sig = vec![0; MAX_COINBASE_SCRIPT + 1];
        assert!(matches!(
            BasicValidator.check_transaction(&tx),
            Err(TransactionError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn rejects_output_overflow() {
        let mut tx = coinbase(1);
        tx.outputs.push(TxOut {
            value: u64::MAX,
            script_pubkey: vec![],
        });
        assert_eq!(
            BasicValidator.check_transaction(&tx),
            Err(TransactionError::ValueOverflow)
        );
    }

    // ------------------------------------------------------------------
    // CompactTargetTrust
    // ------------------------------------------------------------------

    #[test]
    fn harder_target_earns_more_trust() {
        let easy = CompactTargetTrust.block_trust(&node_with_bits(0x1d00ffff));
        let hard = CompactTargetTrust.block_trust(&node_with_bits(0x1c00ffff));
        assert!(hard > easy);
        assert!(easy > ChainTrust::ZERO);
    }

    #[test]
    fn invalid_targets_earn_nothing() {
        assert_eq!(CompactTargetTrust.block_trust(&node_with_bits(0)), ChainTrust::ZERO);
        assert_eq!(
            CompactTargetTrust.block_trust(&node_with_bits(0x1d80ffff)),
            ChainTrust::ZERO
        );
    }

    #[test]
    fn target_high_handles_extremes() {
        assert_eq!(CompactTargetTrust::target_high(0x0300ffff), Some(0));
        assert_eq!(CompactTargetTrust::target_high(0xff7fffff), Some(u128::MAX));
        // 0x1d00ffff: mantissa 0xffff shifted by 208 bits, 80 above the split.
        assert_eq!(
            CompactTargetTrust::target_high(0x1d00ffff),
            Some(0xffff_u128 << 80)
        );
    }
}
