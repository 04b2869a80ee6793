use std::path::Path;

use log::debug;
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Durable home of the mined blocks
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    /// Every stored block in chain order
    fn load_blocks(&self) -> Result<Vec<Block>, StorageError>;

    /// Writes a block and returns once it is durable
    fn append_block(&self, block: &Block) -> Result<(), StorageError>;
}

/// Persistent block store
///
/// Blocks are keyed by their big-endian index so that iteration yields them
/// in chain order. Values are bincode, which keeps every field (including the
/// `f64` amounts) bit-exact.
pub struct BlockchainStorage {
    db: Db,
    blocks: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage").finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;

        Ok(Self { db, blocks })
    }

    /// Saves a block under its index
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.blocks.insert(block.index.to_be_bytes(), value)?;

        debug!("Stored block {} ({})", block.index, block.hash);
        Ok(())
    }

    /// Gets all blocks in chain order
    ///
    /// A block that cannot be decoded fails the whole load; a ledger with a
    /// hole in it is not a ledger.
    pub fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            let block: Block = bincode::deserialize(&value).map_err(|e| {
                StorageError::DeserializationError(format!(
                    "Failed to deserialize block {}: {}",
                    hex::encode(&key),
                    e
                ))
            })?;
            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl BlockStore for BlockchainStorage {
    fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        self.get_all_blocks()
    }

    fn append_block(&self, block: &Block) -> Result<(), StorageError> {
        self.save_block(block)?;
        self.flush()
    }
}
