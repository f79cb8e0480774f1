//! Error types for the Ember block index.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("value overflow")] ValueOverflow,
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("null prevout in non-coinbase input {0}")] NullPrevout(usize),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("no transactions")] NoTransactions,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("proof-of-stake block carries no signature")] MissingSignature,
    #[error("checkpoint mismatch at height {0}")] CheckpointMismatch(u64),
    #[error("rejected: {0}")] Rejected(String),
    #[error("tx error in {index}: {source}")] Transaction { index: usize, source: TransactionError },
}

/// Failures reported by the key-value engine or the record codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("engine: {0}")] Engine(String),
    #[error("codec: {0}")] Codec(String),
    #[error("batch commit failed: {0}")] Commit(String),
}

/// The persisted index contradicts itself and cannot be loaded as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("hashBestChain not loaded")] MissingBestChain,
    #[error("hashBestChain {0} not found in the block index")] DanglingBestChain(String),
    #[error("hashSyncCheckpoint not loaded")] MissingSyncCheckpoint,
    #[error("block {0} not found in the block index")] UnknownBlock(String),
}

/// A block or transaction could not be re-read from its recorded position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("cannot read block at file {file} offset {offset}: {reason}")]
    Block { file: u32, offset: u32, reason: String },
    #[error("cannot read transaction at file {file} offset {offset}: {reason}")]
    Transaction { file: u32, offset: u32, reason: String },
}

/// A cross-consistency check that failed during chain verification.
///
/// Violations are recorded in the verification report and never returned
/// as errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    #[error("bad block: {0}")] BadBlock(BlockError),
    #[error("cannot read mislocated transaction {txid}")] UnreadableTransaction { txid: String },
    #[error("invalid tx position for {txid}")] InvalidTxPosition { txid: String },
    #[error("output {txid}:{output} spent outside the checked chain")] SpendOutsideChain { txid: String, output: u32 },
    #[error("cannot read spending transaction of {txid}:{output}")] UnreadableSpender { txid: String, output: u32 },
    #[error("spending transaction of {txid}:{output} is invalid: {source}")] InvalidSpender { txid: String, output: u32, source: TransactionError },
    #[error("spending transaction of {txid}:{output} does not spend it")] SpenderMismatch { txid: String, output: u32 },
    #[error("unspent prevout {prevout} in {txid}")] UnspentPrevout { prevout: String, txid: String },
}

#[derive(Error, Debug)]
pub enum EmberError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Index(#[from] IndexError),
    #[error(transparent)] Read(#[from] ReadError),
    #[error("schema version {found} is older than required {required}")] SchemaVersionMismatch { found: u32, required: u32 },
    #[error("block file: {0}")] BlockFile(String),
    #[error("chain selection: {0}")] ChainSelection(String),
    #[error("config: {0}")] Config(String),
}
