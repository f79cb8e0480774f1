//! Best-chain integrity verification.
//!
//! Walks back from the tip, re-reading each block and cross-checking it
//! against the transaction index. Levels are cumulative:
//!
//! | Level | Check |
//! |---|---|
//! | 1 | block passes structural validation (signatures too at level 7) |
//! | 2 | every transaction's index record is consistent with its block |
//! | 3 | every indexed transaction re-reads with the same hash |
//! | 4 | every spent marker points into a block already walked |
//! | 5 | every input's prevout is marked spent |
//! | 6 | every spender re-reads, validates, and actually spends the output |
//!
//! A failed check is recorded as a [`Violation`] and moves the fork
//! candidate to the failing block's parent; the walk carries on, so the
//! final candidate is the parent of the oldest bad block found. Only an
//! unreadable block body aborts the walk. The walk stops at the first
//! block whose parent has no loaded record.

use std::collections::HashMap;

use tracing::{info, warn};

use ember_core::block_index::BlockIndexNode;
use ember_core::constants::{DEFAULT_CHECK_DEPTH, DEFAULT_CHECK_LEVEL, MAX_CHECK_LEVEL};
use ember_core::error::{EmberError, IntegrityViolation};
use ember_core::shutdown::ShutdownFlag;
use ember_core::traits::{BlockSource, BlockValidator};
use ember_core::types::{Block, DiskTxPos, Hash256, OutPoint, TxIn};

use crate::index::ChainIndex;
use crate::store::KeyValueEngine;
use crate::txdb::TxDb;

/// Depth used when zero ("unbounded") is requested.
const UNBOUNDED_DEPTH: u64 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    pub check_level: u8,
    /// Blocks back from the tip. Zero means the whole chain.
    pub check_depth: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_LEVEL, DEFAULT_CHECK_DEPTH)
    }
}

impl VerifyOptions {
    /// Options with the level clamped to [`MAX_CHECK_LEVEL`].
    pub fn new(check_level: u8, check_depth: u64) -> Self {
        Self {
            check_level: check_level.min(MAX_CHECK_LEVEL),
            check_depth,
        }
    }

    /// Depth actually walked for a chain whose tip is at `best_height`.
    pub fn effective_depth(&self, best_height: u64) -> u64 {
        let depth = if self.check_depth == 0 {
            UNBOUNDED_DEPTH
        } else {
            self.check_depth
        };
        depth.min(best_height)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub height: u64,
    pub hash: Hash256,
    pub kind: IntegrityViolation,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub blocks_checked: u64,
    pub violations: Vec<Violation>,
    /// Parent of the oldest bad block, if any check failed.
    pub fork_candidate: Option<Hash256>,
    /// Shutdown was requested before the walk finished.
    pub interrupted: bool,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn flag(&mut self, node: &BlockIndexNode, parent: Hash256, kind: IntegrityViolation) {
        warn!(height = node.height, hash = %node.hash, "{kind}");
        self.violations.push(Violation {
            height: node.height,
            hash: node.hash,
            kind,
        });
        self.fork_candidate = Some(parent);
    }
}

/// Verify the best chain of `index` to the configured level and depth.
pub fn verify_chain<E: KeyValueEngine>(
    db: &TxDb<E>,
    index: &ChainIndex,
    source: &dyn BlockSource,
    validator: &dyn BlockValidator,
    options: &VerifyOptions,
    shutdown: &ShutdownFlag,
) -> Result<VerifyReport, EmberError> {
    let mut report = VerifyReport::default();
    let Some(best) = index.best else {
        return Ok(report);
    };

    let depth = options.effective_depth(best.height);
    let floor = best.height - depth;
    info!(
        depth,
        level = options.check_level,
        "verifying last {depth} blocks at level {}",
        options.check_level
    );

    let mut walker = Walker {
        db,
        source,
        validator,
        level: options.check_level,
        block_owner: HashMap::new(),
    };

    let mut cursor = Some(best.hash);
    while let Some(hash) = cursor {
        let Some(node) = index.graph.get(&hash) else {
            break;
        };
        // The root has no parent to fall back to and is never walked.
        let Some(parent) = node.prev else {
            break;
        };
        if !node.has_record {
            break;
        }
        // A parent deferred below the checkpoint window is not a valid
        // fork candidate; its child ends the walk like the root does.
        if !index.graph.get(&parent).is_some_and(|p| p.has_record) {
            break;
        }
        if shutdown.is_requested() {
            report.interrupted = true;
            break;
        }
        if node.height < floor {
            break;
        }

        let block = source.read_block(node.file, node.block_pos)?;
        walker.check_block(node, parent, &block, &mut report)?;
        report.blocks_checked += 1;
        cursor = Some(parent);
    }

    info!(
        checked = report.blocks_checked,
        violations = report.violations.len(),
        interrupted = report.interrupted,
        "chain verification finished"
    );
    Ok(report)
}

struct Walker<'a, E> {
    db: &'a TxDb<E>,
    source: &'a dyn BlockSource,
    validator: &'a dyn BlockValidator,
    level: u8,
    /// `(file, block_pos)` → hash of every block walked so far.
    block_owner: HashMap<(u32, u32), Hash256>,
}

impl<E: KeyValueEngine> Walker<'_, E> {
    fn check_block(
        &mut self,
        node: &BlockIndexNode,
        parent: Hash256,
        block: &Block,
        report: &mut VerifyReport,
    ) -> Result<(), EmberError> {
        if self.level > 0 {
            if let Err(e) = self.validator.check_block(block, self.level > 6) {
                report.flag(node, parent, IntegrityViolation::BadBlock(e));
            }
        }
        if self.level < 2 {
            return Ok(());
        }

        self.block_owner.insert(node.block_key(), node.hash);
        for tx in &block.transactions {
            let txid = tx.txid()?;
            if let Some(record) = self.db.read_tx_index(&txid)? {
                if self.level > 2 || record.pos.block_key() != node.block_key() {
                    self.check_position(node, parent, &txid, &record.pos, report)?;
                }
                if self.level > 3 {
                    for (output, slot) in record.spent.iter().enumerate() {
                        if let Some(spender) = slot {
                            self.check_spender(node, parent, &txid, output as u32, spender, report);
                        }
                    }
                }
            }
            if self.level > 4 {
                self.check_prevouts_spent(node, parent, &txid, &tx.inputs, report)?;
            }
        }
        Ok(())
    }

    /// Level 3: the indexed position holds this transaction (or a duplicate).
    fn check_position(
        &self,
        node: &BlockIndexNode,
        parent: Hash256,
        txid: &Hash256,
        pos: &DiskTxPos,
        report: &mut VerifyReport,
    ) -> Result<(), EmberError> {
        match self.source.read_transaction(pos) {
            Err(_) => report.flag(
                node,
                parent,
                IntegrityViolation::UnreadableTransaction {
                    txid: txid.to_string(),
                },
            ),
            Ok(found) => {
                if found.txid()? != *txid {
                    report.flag(
                        node,
                        parent,
                        IntegrityViolation::InvalidTxPosition {
                            txid: txid.to_string(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Levels 4 and 6 for one spent output.
    fn check_spender(
        &self,
        node: &BlockIndexNode,
        parent: Hash256,
        txid: &Hash256,
        output: u32,
        spender: &DiskTxPos,
        report: &mut VerifyReport,
    ) {
        let txid_str = || txid.to_string();
        if !self.block_owner.contains_key(&spender.block_key()) {
            report.flag(
                node,
                parent,
                IntegrityViolation::SpendOutsideChain {
                    txid: txid_str(),
                    output,
                },
            );
        }
        if self.level <= 5 {
            return;
        }

        let spend = match self.source.read_transaction(spender) {
            Ok(tx) => tx,
            Err(_) => {
                report.flag(
                    node,
                    parent,
                    IntegrityViolation::UnreadableSpender {
                        txid: txid_str(),
                        output,
                    },
                );
                return;
            }
        };
        if let Err(source) = self.validator.check_transaction(&spend) {
            report.flag(
                node,
                parent,
                IntegrityViolation::InvalidSpender {
                    txid: txid_str(),
                    output,
                    source,
                },
            );
            return;
        }
        let target = OutPoint::new(*txid, output);
        if !spend.inputs.iter().any(|input| input.prevout == target) {
            report.flag(
                node,
                parent,
                IntegrityViolation::SpenderMismatch {
                    txid: txid_str(),
                    output,
                },
            );
        }
    }

    /// Level 5: every input's prevout is marked spent in its own index record.
    fn check_prevouts_spent(
        &self,
        node: &BlockIndexNode,
        parent: Hash256,
        txid: &Hash256,
        inputs: &[TxIn],
        report: &mut VerifyReport,
    ) -> Result<(), EmberError> {
        for input in inputs {
            if input.prevout.is_null() {
                continue;
            }
            let Some(prev_record) = self.db.read_tx_index(&input.prevout.hash)? else {
                continue;
            };
            if !prev_record.is_spent(input.prevout.index) {
                report.flag(
                    node,
                    parent,
                    IntegrityViolation::UnspentPrevout {
                        prevout: input.prevout.to_string(),
                        txid: txid.to_string(),
                    },
                );
            }
        }
        Ok(())
    }
}
