use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::crypto::Address;
use super::transaction::Transaction;

/// Previous-hash value carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// A block in the chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position in the chain, zero for genesis
    pub height: u64,

    /// Hash of the block at height - 1
    pub previous_hash: String,

    /// Transactions settled by this block
    pub transactions: Vec<Transaction>,

    /// Creation time
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Proof-of-work search variable
    pub nonce: u64,

    /// SHA-256 of all fields above (derived, re-checked on append)
    pub hash: String,
}

impl Block {
    /// Creates a block and seals it with its computed hash.
    pub fn new(
        height: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: DateTime<Utc>,
        nonce: u64,
    ) -> Self {
        let mut block = Block {
            height,
            previous_hash,
            transactions,
            timestamp,
            nonce,
            hash: String::new(),
        };

        block.hash = block.calculate_hash();
        block
    }

    /// The deterministic genesis block, carrying the configured grants as
    /// coinbase transactions. Exempt from proof-of-work.
    pub fn genesis(grants: &[(Address, u64)]) -> Self {
        let timestamp = DateTime::<Utc>::UNIX_EPOCH;
        let transactions = grants
            .iter()
            .map(|(address, amount)| Transaction::coinbase(address.clone(), *amount, timestamp))
            .collect();

        Block::new(
            0,
            GENESIS_PREVIOUS_HASH.to_string(),
            transactions,
            timestamp,
            0,
        )
    }

    /// Recomputes the block hash from its contents.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        let block_data = serde_json::json!({
            "height": self.height,
            "previous_hash": self.previous_hash,
            "transactions": self.transactions,
            "timestamp": self.timestamp,
            "nonce": self.nonce,
        });

        // Serializing a json! value cannot fail.
        let block_string = serde_json::to_string(&block_data).unwrap_or_default();
        hasher.update(block_string.as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Whether the block hash satisfies a difficulty target, expressed as a
    /// required number of leading zero hex characters.
    pub fn meets_difficulty(&self, difficulty: u8) -> bool {
        let target: String = "0".repeat(difficulty as usize);
        self.hash.starts_with(&target)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}
