//! # ember-index
//! Persistent transaction/block index and startup chain verification.
//!
//! - [`store`]: record store over a key-value engine, with a batch overlay
//! - [`txdb::TxDb`]: typed access to index records and metadata
//! - [`blockfile::FlatBlockFiles`]: append-only `blkNNNN.dat` block storage
//! - [`graph`] / [`index`]: the in-memory block index graph
//! - [`loader`], [`trust`], [`verify`], [`fallback`]: the startup pipeline
//!
//! [`load_block_index`] runs the whole pipeline.

pub mod blockfile;
pub mod config;
pub mod fallback;
pub mod graph;
pub mod index;
pub mod loader;
pub mod store;
pub mod trust;
pub mod txdb;
pub mod verify;

pub use blockfile::FlatBlockFiles;
pub use config::IndexConfig;
pub use fallback::{ChainSelector, RewindBestChain, apply_fork_candidate};
pub use index::{BestChain, ChainIndex};
pub use loader::{LoadMode, LoadSummary, finish_block_index};
pub use txdb::{SchemaStatus, TxDb};
pub use verify::{VerifyOptions, VerifyReport, Violation, verify_chain};

use tracing::{info, warn};

use ember_core::checkpoint::ChainParams;
use ember_core::error::{EmberError, IndexError};
use ember_core::shutdown::ShutdownFlag;
use ember_core::traits::{BlockSource, BlockTrust, BlockValidator};
use ember_core::types::{ChainTrust, Hash256};

use crate::store::KeyValueEngine;

/// Collaborators the load pipeline calls out to.
pub struct Services<'a, E: KeyValueEngine> {
    pub source: &'a dyn BlockSource,
    pub validator: &'a dyn BlockValidator,
    pub trust: &'a dyn BlockTrust,
    pub selector: &'a dyn ChainSelector<E>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub mode: LoadMode,
    pub verify: VerifyOptions,
}

impl From<&IndexConfig> for LoadOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            mode: config.load_mode,
            verify: config.verify_options(),
        }
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub index: ChainIndex,
    pub load: LoadSummary,
    /// `None` when the pipeline stopped before verification.
    pub verify: Option<VerifyReport>,
    /// The block the best chain was moved back to, if any.
    pub fell_back_to: Option<Hash256>,
}

impl LoadOutcome {
    fn stopped(index: ChainIndex, load: LoadSummary) -> Self {
        Self {
            index,
            load,
            verify: None,
            fell_back_to: None,
        }
    }
}

/// Load, rank, resolve, verify, and if needed rewind the block index.
///
/// An empty store yields an empty index. Shutdown after the record scan
/// returns what was loaded so far without verifying it.
pub fn load_block_index<E: KeyValueEngine>(
    db: &mut TxDb<E>,
    params: &ChainParams,
    services: &Services<'_, E>,
    options: &LoadOptions,
    shutdown: &ShutdownFlag,
) -> Result<LoadOutcome, EmberError> {
    let mut index = ChainIndex::new(params.genesis_hash);

    let total = loader::count_block_index_records(db)?;
    let checkpoint = loader::select_sync_checkpoint(&params.checkpoints, total);
    if let Some((height, hash)) = checkpoint {
        info!(total, height, %hash, "selected sync checkpoint");
    }

    let load = loader::load_block_index_records(db, &mut index, options.mode, checkpoint, shutdown)?;
    if shutdown.is_requested() {
        warn!("shutdown requested during block index load");
        return Ok(LoadOutcome::stopped(index, load));
    }

    trust::rank_chain_trust(&mut index, services.trust);
    if !trust::resolve_best_chain(db, &mut index)? {
        info!("block index is empty");
        return Ok(LoadOutcome::stopped(index, load));
    }

    let sync = checkpoint.map_or(params.genesis_hash, |(_, hash)| hash);
    db.write_sync_checkpoint(&sync)?;
    let sync = db
        .read_sync_checkpoint()?
        .ok_or(IndexError::MissingSyncCheckpoint)?;
    index.sync_checkpoint = Some(sync);
    info!(%sync, "sync checkpoint");

    index.best_invalid_trust = db.read_best_invalid_trust()?.unwrap_or(ChainTrust::ZERO);

    let report = verify::verify_chain(
        db,
        &index,
        services.source,
        services.validator,
        &options.verify,
        shutdown,
    )?;

    let mut fell_back_to = None;
    if let Some(candidate) = report.fork_candidate {
        if apply_fork_candidate(db, &mut index, services.source, services.selector, shutdown, candidate)? {
            fell_back_to = Some(candidate);
        }
    }

    Ok(LoadOutcome {
        index,
        load,
        verify: Some(report),
        fell_back_to,
    })
}
