use std::path::Path;

use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corrupt block log: {0}")]
    Corrupt(String),
}

const HEAD_HEIGHT_KEY: &str = "head_height";

/// Durable append-only block log.
///
/// Blocks are keyed by big-endian height so iteration order is chain order.
/// Only blocks are persisted; balances are derived state and are rebuilt by
/// replaying the log on startup.
pub struct LedgerStore {
    db: Db,
    blocks: Tree,
    metadata: Tree,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore").finish()
    }
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks,
            metadata,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Appends one block to the log and advances the head marker.
    pub fn append_block(&self, block: &Block) -> Result<(), StorageError> {
        let key = block.height.to_be_bytes();
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.blocks.insert(key, value)?;
        self.metadata
            .insert(HEAD_HEIGHT_KEY, &block.height.to_be_bytes())?;

        Ok(())
    }

    /// Loads the whole chain, genesis first.
    ///
    /// Heights must be gapless; a hole means the log was truncated out from
    /// under us and replay would silently produce wrong balances.
    pub fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut chain = Vec::new();

        for entry in self.blocks.iter() {
            let (_, value) = entry?;
            let block: Block = bincode::deserialize(&value)
                .map_err(|e| StorageError::Deserialization(e.to_string()))?;

            if block.height != chain.len() as u64 {
                return Err(StorageError::Corrupt(format!(
                    "expected block at height {}, found {}",
                    chain.len(),
                    block.height
                )));
            }

            chain.push(block);
        }

        Ok(chain)
    }

    pub fn head_height(&self) -> Result<Option<u64>, StorageError> {
        match self.metadata.get(HEAD_HEIGHT_KEY)? {
            Some(value) => {
                let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| {
                    StorageError::Corrupt("head height marker has wrong width".to_string())
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
