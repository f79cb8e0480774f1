//! In-memory block index node.
//!
//! One node exists per block hash ever referenced. Links to the previous
//! and next block are hashes resolved through the owning graph, never
//! owning pointers.

use crate::types::{ChainTrust, DiskBlockIndex, Hash256, OutPoint, BLOCK_PROOF_OF_STAKE};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockIndexNode {
    /// Copy of the graph key this node is stored under.
    pub hash: Hash256,
    pub prev: Option<Hash256>,
    /// Best-chain successor.
    pub next: Option<Hash256>,
    /// False while the node is a placeholder created by a neighbour.
    pub has_record: bool,
    pub height: u64,
    /// Filled in by the trust ranker after load.
    pub chain_trust: ChainTrust,
    pub file: u32,
    pub block_pos: u32,
    pub mint: u64,
    pub money_supply: u64,
    pub flags: u32,
    pub stake_modifier: u64,
    pub prevout_stake: OutPoint,
    pub stake_time: u32,
    pub hash_proof_of_stake: Hash256,
    pub version: u32,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockIndexNode {
    /// A default-initialized placeholder for `hash`.
    pub fn placeholder(hash: Hash256) -> Self {
        Self {
            hash,
            ..Self::default()
        }
    }

    /// Overwrite every persisted field from `record`.
    ///
    /// Chain trust is derived state and is left untouched.
    pub fn apply_record(&mut self, record: &DiskBlockIndex) {
        self.prev = record.hash_prev.non_zero();
        self.next = record.hash_next.non_zero();
        self.has_record = true;
        self.height = record.height;
        self.file = record.file;
        self.block_pos = record.block_pos;
        self.mint = record.mint;
        self.money_supply = record.money_supply;
        self.flags = record.flags;
        self.stake_modifier = record.stake_modifier;
        self.prevout_stake = record.prevout_stake;
        self.stake_time = record.stake_time;
        self.hash_proof_of_stake = record.hash_proof_of_stake;
        self.version = record.version;
        self.merkle_root = record.merkle_root;
        self.time = record.time;
        self.bits = record.bits;
        self.nonce = record.nonce;
    }

    /// Project the node back onto its persisted form.
    pub fn to_disk(&self) -> DiskBlockIndex {
        DiskBlockIndex {
            hash_prev: self.prev.unwrap_or(Hash256::ZERO),
            hash_next: self.next.unwrap_or(Hash256::ZERO),
            file: self.file,
            block_pos: self.block_pos,
            height: self.height,
            mint: self.mint,
            money_supply: self.money_supply,
            flags: self.flags,
            stake_modifier: self.stake_modifier,
            prevout_stake: self.prevout_stake,
            stake_time: self.stake_time,
            hash_proof_of_stake: self.hash_proof_of_stake,
            version: self.version,
            merkle_root: self.merkle_root,
            time: self.time,
            bits: self.bits,
            nonce: self.nonce,
        }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_PROOF_OF_STAKE != 0
    }

    /// Block file location as `(file, block_pos)`.
    pub fn block_key(&self) -> (u32, u32) {
        (self.file, self.block_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DiskBlockIndex {
        DiskBlockIndex {
            hash_prev: Hash256([1; 32]),
            hash_next: Hash256::ZERO,
            file: 1,
            block_pos: 400,
            height: 9,
            flags: BLOCK_PROOF_OF_STAKE,
            prevout_stake: OutPoint::new(Hash256([5; 32]), 1),
            stake_time: 1234,
            bits: 0x1d00ffff,
            ..DiskBlockIndex::default()
        }
    }

    #[test]
    fn placeholder_has_no_record() {
        let node = BlockIndexNode::placeholder(Hash256([2; 32]));
        assert!(!node.has_record);
        assert_eq!(node.prev, None);
        assert_eq!(node.height, 0);
    }

    #[test]
    fn apply_record_fills_links_and_fields() {
        let mut node = BlockIndexNode::placeholder(Hash256([2; 32]));
        node.apply_record(&record());
        assert!(node.has_record);
        assert_eq!(node.prev, Some(Hash256([1; 32])));
        assert_eq!(node.next, None);
        assert_eq!(node.block_key(), (1, 400));
        assert!(node.is_proof_of_stake());
    }

    #[test]
    fn to_disk_restores_the_record() {
        let mut node = BlockIndexNode::placeholder(Hash256([2; 32]));
        node.apply_record(&record());
        assert_eq!(node.to_disk(), record());
    }
}
