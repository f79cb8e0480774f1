//! Append-only block files `blkNNNN.dat`.
//!
//! Each block is stored as:
//!
//! ```text
//! magic[4] | header_len u32 | header | tx_count u32
//!          | (tx_len u32 | tx) * tx_count | sig_len u32 | sig
//! ```
//!
//! All integers are little-endian and payloads are bincode. A block is
//! addressed by `(file, block_pos)` where `block_pos` is the offset of its
//! magic; a transaction's `tx_pos` is the offset of its length prefix, so
//! a single transaction can be read without decoding the whole block.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use ember_core::constants::{BLOCK_FILE_MAGIC, MAX_BLOCK_FILE_SIZE};
use ember_core::error::{EmberError, ReadError};
use ember_core::traits::BlockSource;
use ember_core::types::{Block, BlockHeader, DiskTxPos, Transaction};

/// Where a block and its transactions landed on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLocation {
    pub file: u32,
    pub block_pos: u32,
    /// Position of each transaction, in block order.
    pub tx_positions: Vec<DiskTxPos>,
}

pub struct FlatBlockFiles {
    dir: PathBuf,
    max_file_size: u64,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    current_file: u32,
    current_len: u64,
}

fn block_file_name(file: u32) -> String {
    format!("blk{file:04}.dat")
}

impl FlatBlockFiles {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EmberError> {
        Self::with_max_size(dir, MAX_BLOCK_FILE_SIZE)
    }

    pub fn with_max_size(dir: impl Into<PathBuf>, max_file_size: u64) -> Result<Self, EmberError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| EmberError::BlockFile(e.to_string()))?;
        let (current_file, current_len) = Self::locate_active_file(&dir, max_file_size)?;
        Ok(Self {
            dir,
            max_file_size,
            state: Mutex::new(FileState {
                current_file,
                current_len,
            }),
        })
    }

    pub fn file_path(&self, file: u32) -> PathBuf {
        self.dir.join(block_file_name(file))
    }

    /// Append `block`, rolling over to a new file when the current one is full.
    pub fn append_block(&self, block: &Block) -> Result<BlockLocation, EmberError> {
        let (bytes, tx_offsets) = encode_block(block)?;
        let mut state = self.state.lock();
        if state.current_len > 0 && state.current_len + bytes.len() as u64 > self.max_file_size {
            state.current_file += 1;
            state.current_len = 0;
        }

        let block_pos = u32::try_from(state.current_len)
            .map_err(|_| EmberError::BlockFile("block file offset exceeds u32".into()))?;
        let file = state.current_file;
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(file))
            .map_err(|e| EmberError::BlockFile(e.to_string()))?;
        handle
            .write_all(&bytes)
            .and_then(|_| handle.flush())
            .map_err(|e| EmberError::BlockFile(e.to_string()))?;
        state.current_len += bytes.len() as u64;

        debug!(file, block_pos, len = bytes.len(), "appended block");
        Ok(BlockLocation {
            file,
            block_pos,
            tx_positions: tx_offsets
                .into_iter()
                .map(|rel| DiskTxPos::new(file, block_pos, block_pos + rel))
                .collect(),
        })
    }

    /// Delete every `blkNNNN.dat`, starting at file 1 and stopping at the
    /// first gap. Returns the number of files removed.
    pub fn remove_all(&self) -> Result<u32, EmberError> {
        let mut state = self.state.lock();
        let mut removed = 0;
        let mut file = 1u32;
        loop {
            let path = self.file_path(file);
            if !path.exists() {
                break;
            }
            std::fs::remove_file(&path).map_err(|e| EmberError::BlockFile(e.to_string()))?;
            removed += 1;
            file += 1;
        }
        state.current_file = 1;
        state.current_len = 0;
        info!(removed, dir = %self.dir.display(), "removed block files");
        Ok(removed)
    }

    fn locate_active_file(dir: &Path, max_file_size: u64) -> Result<(u32, u64), EmberError> {
        let mut file = 1u32;
        let mut last: Option<(u32, u64)> = None;
        loop {
            let path = dir.join(block_file_name(file));
            if !path.exists() {
                break;
            }
            let len = std::fs::metadata(&path)
                .map_err(|e| EmberError::BlockFile(e.to_string()))?
                .len();
            last = Some((file, len));
            file += 1;
        }
        Ok(match last {
            Some((id, len)) if len >= max_file_size => (id + 1, 0),
            Some((id, len)) => (id, len),
            None => (1, 0),
        })
    }

    fn open_at(&self, file: u32, offset: u32) -> std::io::Result<File> {
        let mut handle = File::open(self.file_path(file))?;
        handle.seek(SeekFrom::Start(offset as u64))?;
        Ok(handle)
    }
}

fn encode_block(block: &Block) -> Result<(Vec<u8>, Vec<u32>), EmberError> {
    let config = bincode::config::standard();
    let header = bincode::encode_to_vec(&block.header, config)
        .map_err(|e| EmberError::BlockFile(e.to_string()))?;

    let mut out = Vec::new();
    out.extend_from_slice(&BLOCK_FILE_MAGIC);
    push_chunk(&mut out, &header)?;
    out.extend_from_slice(&len_u32(block.transactions.len())?.to_le_bytes());

    let mut tx_offsets = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let bytes =
            bincode::encode_to_vec(tx, config).map_err(|e| EmberError::BlockFile(e.to_string()))?;
        tx_offsets.push(len_u32(out.len())?);
        push_chunk(&mut out, &bytes)?;
    }
    push_chunk(&mut out, &block.signature)?;
    Ok((out, tx_offsets))
}

fn push_chunk(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), EmberError> {
    out.extend_from_slice(&len_u32(bytes.len())?.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn len_u32(len: usize) -> Result<u32, EmberError> {
    u32::try_from(len).map_err(|_| EmberError::BlockFile(format!("length {len} exceeds u32")))
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a length-prefixed chunk. Lengths beyond a whole block file come
/// from a corrupt position and are rejected before allocating.
fn read_chunk(reader: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let len = read_u32(reader)?;
    if len as u64 > MAX_BLOCK_FILE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("chunk length {len} exceeds block file size {MAX_BLOCK_FILE_SIZE}"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, String> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| e.to_string())
}

impl BlockSource for FlatBlockFiles {
    fn read_block(&self, file: u32, block_pos: u32) -> Result<Block, ReadError> {
        let fail = |reason: String| ReadError::Block {
            file,
            offset: block_pos,
            reason,
        };
        let mut handle = self.open_at(file, block_pos).map_err(|e| fail(e.to_string()))?;

        let mut magic = [0u8; 4];
        handle.read_exact(&mut magic).map_err(|e| fail(e.to_string()))?;
        if magic != BLOCK_FILE_MAGIC {
            return Err(fail("bad magic".into()));
        }

        let header: BlockHeader =
            decode(&read_chunk(&mut handle).map_err(|e| fail(e.to_string()))?).map_err(fail)?;
        let tx_count = read_u32(&mut handle).map_err(|e| fail(e.to_string()))?;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            let bytes = read_chunk(&mut handle).map_err(|e| fail(e.to_string()))?;
            transactions.push(decode(&bytes).map_err(fail)?);
        }
        let signature = read_chunk(&mut handle).map_err(|e| fail(e.to_string()))?;

        Ok(Block {
            header,
            transactions,
            signature,
        })
    }

    fn read_transaction(&self, pos: &DiskTxPos) -> Result<Transaction, ReadError> {
        let fail = |reason: String| ReadError::Transaction {
            file: pos.file,
            offset: pos.tx_pos,
            reason,
        };
        let mut handle = self
            .open_at(pos.file, pos.tx_pos)
            .map_err(|e| fail(e.to_string()))?;
        let bytes = read_chunk(&mut handle).map_err(|e| fail(e.to_string()))?;
        decode(&bytes).map_err(fail)
    }
}
