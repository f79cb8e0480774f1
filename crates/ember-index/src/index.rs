//! The in-memory chain index: block graph plus best-chain state.
//!
//! A [`ChainIndex`] is built by the loader and then mutated only by the
//! trust ranker and the reorg fallback. Callers must not run two
//! index-mutating passes against the same instance concurrently.

use std::collections::HashSet;

use ember_core::block_index::BlockIndexNode;
use ember_core::error::IndexError;
use ember_core::types::{ChainTrust, DiskBlockIndex, Hash256, OutPoint};

use crate::graph::BlockIndexGraph;

/// Pointer to the canonical tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestChain {
    pub hash: Hash256,
    pub height: u64,
    pub trust: ChainTrust,
}

#[derive(Debug)]
pub struct ChainIndex {
    pub graph: BlockIndexGraph,
    genesis_hash: Hash256,
    /// Set once the genesis record has been loaded.
    pub genesis: Option<Hash256>,
    pub best: Option<BestChain>,
    /// `(staked outpoint, stake time)` of every proof-of-stake block loaded.
    pub stake_seen: HashSet<(OutPoint, u32)>,
    pub sync_checkpoint: Option<Hash256>,
    pub best_invalid_trust: ChainTrust,
    /// Records below this height were skipped by a checkpoint-window load
    /// and are still waiting for backfill.
    pub deferred_floor: Option<u64>,
}

impl ChainIndex {
    pub fn new(genesis_hash: Hash256) -> Self {
        Self {
            graph: BlockIndexGraph::new(),
            genesis_hash,
            genesis: None,
            best: None,
            stake_seen: HashSet::new(),
            sync_checkpoint: None,
            best_invalid_trust: ChainTrust::ZERO,
            deferred_floor: None,
        }
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }

    /// Apply one disk record, tracking genesis and stake entries.
    pub fn insert_record(&mut self, hash: Hash256, record: &DiskBlockIndex) {
        let node = self.graph.apply_disk_record(hash, record);
        let stake = node
            .is_proof_of_stake()
            .then(|| (node.prevout_stake, node.stake_time));

        if self.genesis.is_none() && hash == self.genesis_hash {
            self.genesis = Some(hash);
        }
        if let Some(entry) = stake {
            self.stake_seen.insert(entry);
        }
    }

    /// Point the best chain at `hash`, copying its height and trust.
    pub fn set_best(&mut self, hash: Hash256) -> Result<BestChain, IndexError> {
        let node = self
            .graph
            .get(&hash)
            .ok_or_else(|| IndexError::DanglingBestChain(hash.to_string()))?;
        let best = BestChain {
            hash,
            height: node.height,
            trust: node.chain_trust,
        };
        self.best = Some(best);
        Ok(best)
    }

    pub fn best_height(&self) -> Option<u64> {
        self.best.map(|b| b.height)
    }

    pub fn node(&self, hash: &Hash256) -> Result<&BlockIndexNode, IndexError> {
        self.graph
            .get(hash)
            .ok_or_else(|| IndexError::UnknownBlock(hash.to_string()))
    }
}
