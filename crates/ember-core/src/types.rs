//! Core protocol types: transactions, blocks, and the records the
//! transaction database keeps for them.
//!
//! Positions inside block files are `u32` offsets; all other numeric
//! fields follow the block header wire layout.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Add;

use crate::error::TransactionError;

/// Block flag: the block is proof-of-stake.
pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;
/// Block flag: the entropy bit used by stake modifier selection.
pub const BLOCK_STAKE_ENTROPY: u32 = 1 << 1;
/// Block flag: the block generated a new stake modifier.
pub const BLOCK_STAKE_MODIFIER: u32 = 1 << 2;

/// A 32-byte hash value.
///
/// Used for transaction hashes, block hashes, and merkle roots, all of
/// which are double SHA-256.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Marks "no block" in previous/next links.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// `None` for the zero hash, `Some(self)` otherwise.
    pub fn non_zero(self) -> Option<Self> {
        if self.is_zero() { None } else { Some(self) }
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Hash of the transaction containing the referenced output.
    pub hash: Hash256,
    /// Index of the output within the transaction.
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    /// The null outpoint, used for coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxIn {
    /// The outpoint being spent. Null for coinbase.
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// An empty output marks the first output of a coinstake.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub version: u32,
    /// Transaction timestamp; for coinstakes this is the stake time.
    pub time: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Transaction hash: double SHA-256 of the canonical bincode encoding.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(sha256d(&encoded))
    }

    /// Check if this is a coinbase transaction (single input with null prevout).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// A coinstake spends a real output and leaves its first output empty.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing.
    const HASH_SIZE: usize = 4 * 4 + 2 * 32;

    /// Compute the block hash (double SHA-256).
    ///
    /// Fixed byte layout: version || prev_hash || merkle_root || time ||
    /// bits || nonce, integers little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.time.to_le_bytes());
        data.extend_from_slice(&self.bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        sha256d(&data)
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    /// First transaction must be coinbase; a proof-of-stake block carries
    /// its coinstake second.
    pub transactions: Vec<Transaction>,
    /// Block signature by the staker. Empty for proof-of-work blocks.
    pub signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    /// The staked outpoint and stake time of a proof-of-stake block.
    pub fn stake_entry(&self) -> Option<(OutPoint, u32)> {
        if !self.is_proof_of_stake() {
            return None;
        }
        let coinstake = &self.transactions[1];
        Some((coinstake.inputs[0].prevout, coinstake.time))
    }
}

/// Location of a transaction inside the block files.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DiskTxPos {
    /// Block file number.
    pub file: u32,
    /// Offset of the containing block in that file.
    pub block_pos: u32,
    /// Offset of the transaction itself in that file.
    pub tx_pos: u32,
}

impl DiskTxPos {
    pub fn new(file: u32, block_pos: u32, tx_pos: u32) -> Self {
        Self {
            file,
            block_pos,
            tx_pos,
        }
    }

    /// The `(file, block_pos)` pair identifying the containing block.
    pub fn block_key(&self) -> (u32, u32) {
        (self.file, self.block_pos)
    }
}

impl fmt::Display for DiskTxPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(file={}, block={}, tx={})",
            self.file, self.block_pos, self.tx_pos
        )
    }
}

/// Persisted record under `("tx", hash)`.
///
/// `spent` holds one slot per output of the referenced transaction; a
/// slot carries the position of the spending transaction once spent.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct TxIndexRecord {
    pub pos: DiskTxPos,
    pub spent: Vec<Option<DiskTxPos>>,
}

impl TxIndexRecord {
    /// A fresh record with every output unspent.
    pub fn new(pos: DiskTxPos, output_count: usize) -> Self {
        Self {
            pos,
            spent: vec![None; output_count],
        }
    }

    /// Whether output `index` is recorded as spent.
    ///
    /// A marker array too short to hold `index` reports unspent.
    pub fn is_spent(&self, index: u32) -> bool {
        self.spent
            .get(index as usize)
            .is_some_and(|slot| slot.is_some())
    }
}

/// Cumulative chain trust.
///
/// Addition saturates so that a corrupt chain of extreme difficulty can
/// never wrap around below an honest one.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ChainTrust(pub u128);

impl ChainTrust {
    pub const ZERO: Self = Self(0);
}

impl Add for ChainTrust {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for ChainTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Persisted record under `("blockindex", hash)`.
///
/// The on-disk projection of one block: its links, file location, stake
/// bookkeeping, supply accounting, and header fields. The block hash is
/// recomputed from the header fields and is not stored.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DiskBlockIndex {
    pub hash_prev: Hash256,
    /// Best-chain successor; zero when this block is the tip or off-chain.
    pub hash_next: Hash256,
    pub file: u32,
    pub block_pos: u32,
    pub height: u64,
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

impl DiskBlockIndex {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            version: self.version,
            prev_hash: self.hash_prev,
            merkle_root: self.merkle_root,
            time: self.time,
            bits: self.bits,
            nonce: self.nonce,
        }
    }

    pub fn block_hash(&self) -> Hash256 {
        self.header().hash()
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_PROOF_OF_STAKE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_coinbase() -> Transaction {
        Transaction {
            version: 1,
            time: 1_700_000_000,
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![1, 2],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 50,
                script_pubkey: vec![0xAA],
            }],
            lock_time: 0,
        }
    }

    fn sample_coinstake() -> Transaction {
        Transaction {
            version: 1,
            time: 1_700_000_100,
            inputs: vec![TxIn {
                prevout: OutPoint::new(Hash256([0x11; 32]), 2),
                script_sig: vec![],
                sequence: u32::MAX,
            }],
            outputs: vec![
                TxOut {
                    value: 0,
                    script_pubkey: vec![],
                },
                TxOut {
                    value: 100,
                    script_pubkey: vec![0xBB],
                },
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn hash256_display_hex() {
        let s = format!("{}", Hash256([0xAB; 32]));
        assert_eq!(s.len(), 64);
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn zero_hash_has_no_link() {
        assert_eq!(Hash256::ZERO.non_zero(), None);
        assert_eq!(Hash256([1; 32]).non_zero(), Some(Hash256([1; 32])));
    }

    #[test]
    fn coinbase_and_coinstake_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_coinbase().is_coinstake());
        assert!(sample_coinstake().is_coinstake());
        assert!(!sample_coinstake().is_coinbase());
    }

    #[test]
    fn txid_is_deterministic_and_content_bound() {
        let tx = sample_coinbase();
        assert_eq!(tx.txid().unwrap(), tx.clone().txid().unwrap());
        let mut other = tx.clone();
        other.lock_time = 1;
        assert_ne!(tx.txid().unwrap(), other.txid().unwrap());
    }

    #[test]
    fn proof_of_stake_block_exposes_stake_entry() {
        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: Hash256::ZERO,
                time: 0,
                bits: 0,
                nonce: 0,
            },
            transactions: vec![sample_coinbase(), sample_coinstake()],
            signature: vec![9; 64],
        };
        assert!(block.is_proof_of_stake());
        assert_eq!(
            block.stake_entry(),
            Some((OutPoint::new(Hash256([0x11; 32]), 2), 1_700_000_100))
        );
    }

    #[test]
    fn tx_index_record_sizes_markers_to_outputs() {
        let record = TxIndexRecord::new(DiskTxPos::new(1, 10, 20), 3);
        assert_eq!(record.spent.len(), 3);
        assert!(!record.is_spent(0));
        assert!(!record.is_spent(7));
    }

    #[test]
    fn disk_block_index_hash_matches_header() {
        let record = DiskBlockIndex {
            hash_prev: Hash256([3; 32]),
            merkle_root: Hash256([4; 32]),
            version: 2,
            time: 77,
            bits: 0x1d00ffff,
            nonce: 5,
            ..DiskBlockIndex::default()
        };
        assert_eq!(record.block_hash(), record.header().hash());
        assert_eq!(record.header().prev_hash, Hash256([3; 32]));
    }

    #[test]
    fn chain_trust_addition_saturates() {
        let high = ChainTrust(u128::MAX - 1);
        assert_eq!(high + ChainTrust(10), ChainTrust(u128::MAX));
        assert_eq!(ChainTrust(2) + ChainTrust(3), ChainTrust(5));
    }
}
