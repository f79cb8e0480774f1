//! Rebuild the block index graph from the `"blockindex"` records.

use serde::Deserialize;
use tracing::{debug, info};

use ember_core::checkpoint::Checkpoints;
use ember_core::constants::CHECKPOINT_SAFETY_MARGIN;
use ember_core::error::StoreError;
use ember_core::shutdown::ShutdownFlag;
use ember_core::traits::BlockTrust;
use ember_core::types::{DiskBlockIndex, Hash256};

use crate::index::ChainIndex;
use crate::store::KeyValueEngine;
use crate::trust::rank_chain_trust;
use crate::txdb::{TxDb, BLOCK_INDEX_PREFIX};

/// How much of the block index to load at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Load every record.
    #[default]
    Full,
    /// Load only records at or above the sync checkpoint height (plus
    /// genesis). The rest can be backfilled with [`finish_block_index`].
    CheckpointWindow,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records seen in the scan.
    pub scanned: u64,
    /// Records applied to the graph.
    pub loaded: u64,
    /// Records left for backfill.
    pub deferred: u64,
    /// Shutdown was requested before the scan finished.
    pub interrupted: bool,
}

pub fn count_block_index_records<E: KeyValueEngine>(db: &TxDb<E>) -> Result<u64, StoreError> {
    let total = db.store().count_prefix(BLOCK_INDEX_PREFIX)?;
    debug!(total, "counted block index records");
    Ok(total)
}

/// Highest checkpoint strictly below `total - CHECKPOINT_SAFETY_MARGIN`.
pub fn select_sync_checkpoint(checkpoints: &Checkpoints, total: u64) -> Option<(u64, Hash256)> {
    checkpoints.select_sync_checkpoint(total, CHECKPOINT_SAFETY_MARGIN)
}

/// Scan every `"blockindex"` record into `index`.
///
/// In [`LoadMode::CheckpointWindow`] with a checkpoint, records below the
/// checkpoint height are skipped (genesis excepted) and
/// `index.deferred_floor` is set. Shutdown is polled between records; an
/// interrupted scan returns its partial result.
pub fn load_block_index_records<E: KeyValueEngine>(
    db: &TxDb<E>,
    index: &mut ChainIndex,
    mode: LoadMode,
    checkpoint: Option<(u64, Hash256)>,
    shutdown: &ShutdownFlag,
) -> Result<LoadSummary, StoreError> {
    let floor = match (mode, checkpoint) {
        (LoadMode::CheckpointWindow, Some((height, _))) => Some(height),
        _ => None,
    };

    let mut summary = LoadSummary::default();
    for item in db.store().scan_prefix::<DiskBlockIndex>(BLOCK_INDEX_PREFIX)? {
        if shutdown.is_requested() {
            summary.interrupted = true;
            break;
        }
        let (hash, record) = item?;
        summary.scanned += 1;

        let below = floor.is_some_and(|f| record.height < f);
        if below && hash != index.genesis_hash() {
            summary.deferred += 1;
            continue;
        }
        index.insert_record(hash, &record);
        summary.loaded += 1;
    }

    index.deferred_floor = if summary.deferred > 0 { floor } else { None };
    info!(
        scanned = summary.scanned,
        loaded = summary.loaded,
        deferred = summary.deferred,
        nodes = index.graph.len(),
        "loaded block index"
    );
    Ok(summary)
}

/// Backfill records skipped by a checkpoint-window load.
///
/// Every record below the deferred floor is applied again, overwriting
/// whatever the node holds, then chain trust is recomputed and the best
/// chain's cached trust refreshed. Interrupting leaves the floor in place
/// so the pass can be rerun.
pub fn finish_block_index<E: KeyValueEngine>(
    db: &TxDb<E>,
    index: &mut ChainIndex,
    trust: &dyn BlockTrust,
    shutdown: &ShutdownFlag,
) -> Result<LoadSummary, StoreError> {
    let mut summary = LoadSummary::default();
    let Some(floor) = index.deferred_floor else {
        return Ok(summary);
    };

    for item in db.store().scan_prefix::<DiskBlockIndex>(BLOCK_INDEX_PREFIX)? {
        if shutdown.is_requested() {
            summary.interrupted = true;
            break;
        }
        let (hash, record) = item?;
        summary.scanned += 1;
        if record.height < floor {
            index.insert_record(hash, &record);
            summary.loaded += 1;
        }
    }

    if summary.interrupted {
        info!(loaded = summary.loaded, "block index backfill interrupted");
        return Ok(summary);
    }

    index.deferred_floor = None;
    rank_chain_trust(index, trust);
    // Ancestry changed, so the tip's cumulative trust did too.
    let refreshed = index
        .best
        .and_then(|b| index.graph.get(&b.hash))
        .map(|n| n.chain_trust);
    if let (Some(best), Some(trust)) = (index.best.as_mut(), refreshed) {
        best.trust = trust;
    }
    info!(
        loaded = summary.loaded,
        nodes = index.graph.len(),
        "finished block index backfill"
    );
    Ok(summary)
}
