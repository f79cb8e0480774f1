//! Cumulative chain trust and best-chain resolution.

use tracing::{debug, info};

use ember_core::error::{EmberError, IndexError};
use ember_core::traits::BlockTrust;
use ember_core::types::{ChainTrust, Hash256};

use crate::index::ChainIndex;
use crate::store::KeyValueEngine;
use crate::txdb::TxDb;

/// Annotate every node with `trust(prev) + own trust`.
///
/// Nodes are visited by ascending `(height, hash)`. A node's predecessor
/// always has a lower height, so it is annotated first; the hash tie-break
/// only makes the visiting order reproducible.
pub fn rank_chain_trust(index: &mut ChainIndex, trust: &dyn BlockTrust) {
    let mut order: Vec<(u64, Hash256)> = index
        .graph
        .iter()
        .map(|(hash, node)| (node.height, *hash))
        .collect();
    order.sort_unstable();

    for (_, hash) in &order {
        let Some(node) = index.graph.get(hash) else {
            continue;
        };
        let base = node
            .prev
            .and_then(|p| index.graph.get(&p))
            .map_or(ChainTrust::ZERO, |p| p.chain_trust);
        let total = base + trust.block_trust(node);
        if let Some(node) = index.graph.get_mut(hash) {
            node.chain_trust = total;
        }
    }
    debug!(nodes = order.len(), "ranked chain trust");
}

/// Load `"hashBestChain"` and point the index at it.
///
/// Returns `Ok(false)` for an empty store (no best chain and no genesis).
pub fn resolve_best_chain<E: KeyValueEngine>(
    db: &TxDb<E>,
    index: &mut ChainIndex,
) -> Result<bool, EmberError> {
    let Some(hash) = db.read_hash_best_chain()? else {
        if index.genesis.is_none() {
            return Ok(false);
        }
        return Err(IndexError::MissingBestChain.into());
    };
    let best = index.set_best(hash)?;
    info!(height = best.height, %hash, trust = %best.trust, "resolved best chain");
    Ok(true)
}
