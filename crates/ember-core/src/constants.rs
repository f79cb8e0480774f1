//! Network parameters and index constants.

use serde::{Deserialize, Serialize};

use crate::types::Hash256;

/// Transaction database schema version. Stores written with an older
/// version are wiped and rebuilt on open.
pub const DATABASE_VERSION: u32 = 70_510;

/// Blocks kept below the tip when choosing a load checkpoint.
pub const CHECKPOINT_SAFETY_MARGIN: u64 = 250;

/// Default block cache for the key-value engine, in MiB.
pub const DEFAULT_DB_CACHE_MB: usize = 25;

/// Default verification level at startup.
pub const DEFAULT_CHECK_LEVEL: u8 = 1;

/// Highest verification level; each level includes the ones below.
pub const MAX_CHECK_LEVEL: u8 = 7;

/// Default number of blocks verified back from the tip. Zero means all.
pub const DEFAULT_CHECK_DEPTH: u64 = 2500;

/// Block files roll over once they would exceed this size.
pub const MAX_BLOCK_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Marker written in front of every block in a block file.
pub const BLOCK_FILE_MAGIC: [u8; 4] = [0xe4, 0xe8, 0xe9, 0xe5];

/// Mainnet genesis block hash.
pub const MAINNET_GENESIS: Hash256 = Hash256([
    0xa6, 0x0a, 0xc4, 0x3c, 0x88, 0xdb, 0xc4, 0x4b, 0x82, 0x6c, 0xf3, 0x15, 0x35, 0x2a, 0x8a, 0x7b,
    0x37, 0x3d, 0x2a, 0xf8, 0xb6, 0xe1, 0xc4, 0xc4, 0xa0, 0x63, 0x88, 0x59, 0xc5, 0xe9, 0xec, 0xd1,
]);

/// Testnet genesis block hash.
pub const TESTNET_GENESIS: Hash256 = Hash256([
    0x0f, 0x9d, 0x8e, 0x7b, 0x53, 0x2a, 0x2c, 0xfa, 0x1b, 0x5f, 0x09, 0x8e, 0x7c, 0x31, 0x4b, 0x1f,
    0x6a, 0x72, 0x00, 0x19, 0x3d, 0x9e, 0x48, 0xc2, 0x91, 0x0b, 0x7e, 0x55, 0x1d, 0x3a, 0x86, 0x44,
]);

/// Mainnet checkpoints: (height, block hash).
pub const MAINNET_CHECKPOINTS: &[(u64, [u8; 32])] = &[
    (0, MAINNET_GENESIS.0),
    (
        10_000,
        [
            0x00, 0x00, 0x1f, 0x9e, 0x4a, 0x31, 0xb6, 0x7c, 0x2d, 0x59, 0x8a, 0x0e, 0x6f, 0x13,
            0xc4, 0x77, 0x25, 0xe8, 0x90, 0x1b, 0x4d, 0xa2, 0x6c, 0x38, 0xf0, 0x5b, 0x17, 0x9d,
            0x82, 0xe6, 0x41, 0xca,
        ],
    ),
];

/// Testnet checkpoints: (height, block hash).
pub const TESTNET_CHECKPOINTS: &[(u64, [u8; 32])] = &[(0, TESTNET_GENESIS.0)];

/// Network type: Mainnet, Testnet, or Regtest.
///
/// Selects the genesis block, checkpoint list, and data directory suffix.
///
/// # Examples
///
/// ```
/// use ember_core::constants::NetworkType;
/// assert_eq!(NetworkType::default(), NetworkType::Mainnet);
/// assert_eq!(NetworkType::Testnet.data_dir_suffix(), "testnet");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Mainnet,
    Testnet,
    /// Local regression-test network. Its genesis is the compiled-in
    /// [`regtest_genesis_block`](crate::genesis::regtest_genesis_block).
    Regtest,
}

impl NetworkType {
    /// Subdirectory name under the base data directory.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Genesis block hash.
    pub fn genesis_hash(&self) -> Hash256 {
        match self {
            Self::Mainnet => MAINNET_GENESIS,
            Self::Testnet => TESTNET_GENESIS,
            Self::Regtest => crate::genesis::regtest_genesis_hash(),
        }
    }

    /// Compiled-in checkpoints for this network.
    pub fn checkpoints(&self) -> &'static [(u64, [u8; 32])] {
        match self {
            Self::Mainnet => MAINNET_CHECKPOINTS,
            Self::Testnet => TESTNET_CHECKPOINTS,
            Self::Regtest => &[],
        }
    }
}
