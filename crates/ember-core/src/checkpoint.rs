//! Checkpoint registry and chain parameters.
//!
//! Checkpoints pin known-good blocks by height. The index loader uses them
//! to choose a sync checkpoint a safe distance below the tip, and callers
//! may use [`Checkpoints::check`] to reject blocks that contradict a pin.

use std::collections::BTreeMap;

use crate::constants::NetworkType;
use crate::error::BlockError;
use crate::types::Hash256;

/// Height → hash checkpoint registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoints {
    pins: BTreeMap<u64, Hash256>,
}

impl Checkpoints {
    pub fn new(pins: impl IntoIterator<Item = (u64, Hash256)>) -> Self {
        Self {
            pins: pins.into_iter().collect(),
        }
    }

    /// Build from a compiled-in `(height, bytes)` list.
    pub fn from_static(list: &[(u64, [u8; 32])]) -> Self {
        Self::new(list.iter().map(|&(h, bytes)| (h, Hash256(bytes))))
    }

    pub fn get(&self, height: u64) -> Option<Hash256> {
        self.pins.get(&height).copied()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Height of the most recent checkpoint, or 0 if there are none.
    pub fn last_height(&self) -> u64 {
        self.pins.keys().next_back().copied().unwrap_or(0)
    }

    /// Verify that a block at `height` matches the pin there, if any.
    pub fn check(&self, height: u64, hash: &Hash256) -> Result<(), BlockError> {
        match self.pins.get(&height) {
            Some(pinned) if pinned != hash => Err(BlockError::CheckpointMismatch(height)),
            _ => Ok(()),
        }
    }

    /// Highest checkpoint strictly below `total - margin`.
    ///
    /// Returns `None` when the store holds too few records for any
    /// checkpoint to clear the margin.
    pub fn select_sync_checkpoint(&self, total: u64, margin: u64) -> Option<(u64, Hash256)> {
        let limit = total.saturating_sub(margin);
        self.pins
            .range(..limit)
            .next_back()
            .map(|(&height, &hash)| (height, hash))
    }
}

/// Per-network parameters the index needs at load time.
#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: NetworkType,
    pub genesis_hash: Hash256,
    pub checkpoints: Checkpoints,
}

impl ChainParams {
    /// Compiled-in parameters for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            genesis_hash: network.genesis_hash(),
            checkpoints: Checkpoints::from_static(network.checkpoints()),
        }
    }

    /// Explicit parameters, for regtest chains and tests.
    pub fn new(network: NetworkType, genesis_hash: Hash256, checkpoints: Checkpoints) -> Self {
        Self {
            network,
            genesis_hash,
            checkpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pins() -> Checkpoints {
        Checkpoints::new([
            (0, Hash256([0x01; 32])),
            (100, Hash256([0xAA; 32])),
            (500, Hash256([0xBB; 32])),
        ])
    }

    // ------------------------------------------------------------------
    // check
    // ------------------------------------------------------------------

    #[test]
    fn check_passes_for_matching_hash() {
        assert!(pins().check(100, &Hash256([0xAA; 32])).is_ok());
    }

    #[test]
    fn check_fails_for_wrong_hash() {
        let err = pins().check(500, &Hash256([0xFF; 32])).unwrap_err();
        assert_eq!(err, BlockError::CheckpointMismatch(500));
    }

    #[test]
    fn check_passes_without_pin() {
        for height in [1, 99, 101, u64::MAX] {
            assert!(pins().check(height, &Hash256([0xDE; 32])).is_ok());
        }
    }

    // ------------------------------------------------------------------
    // select_sync_checkpoint
    // ------------------------------------------------------------------

    #[test]
    fn selects_highest_below_margin() {
        // limit = 800 - 250 = 550
        assert_eq!(
            pins().select_sync_checkpoint(800, 250),
            Some((500, Hash256([0xBB; 32])))
        );
        // limit = 750 - 250 = 500, strictly below
        assert_eq!(
            pins().select_sync_checkpoint(750, 250),
            Some((100, Hash256([0xAA; 32])))
        );
    }

    #[test]
    fn small_store_selects_nothing() {
        assert_eq!(pins().select_sync_checkpoint(200, 250), None);
        assert_eq!(pins().select_sync_checkpoint(250, 250), None);
        assert_eq!(pins().select_sync_checkpoint(251, 250), Some((0, Hash256([0x01; 32]))));
    }

    #[test]
    fn last_height_of_empty_registry_is_zero() {
        assert_eq!(Checkpoints::default().last_height(), 0);
        assert_eq!(pins().last_height(), 500);
    }

    #[test]
    fn mainnet_params_pin_genesis() {
        let params = ChainParams::for_network(NetworkType::Mainnet);
        assert_eq!(params.checkpoints.get(0), Some(params.genesis_hash));
    }
}
