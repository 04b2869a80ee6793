use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::hash::{self, HashError};
use super::transaction::Transaction;

/// Previous hash recorded in the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work
    pub nonce: u64,

    /// Hash of the current block, cached once the nonce is found
    pub hash: String,
}

/// The hashed view of a block. `hash` itself is left out.
#[derive(Serialize)]
struct BlockHeader<'a> {
    index: u64,
    timestamp: &'a DateTime<Utc>,
    transactions: &'a [String],
    previous_hash: &'a str,
    nonce: u64,
}

/// A block's hashed content with the transactions serialized once
///
/// Only the nonce varies between attempts, so a nonce search builds this
/// up front and reuses it.
#[derive(Debug)]
pub struct HeaderTemplate<'a> {
    block: &'a Block,
    transactions: Vec<String>,
}

impl HeaderTemplate<'_> {
    /// Hash of the block with `nonce` in place of its own
    pub fn hash_with_nonce(&self, nonce: u64) -> Result<String, HashError> {
        hash::hash(&BlockHeader {
            index: self.block.index,
            timestamp: &self.block.timestamp,
            transactions: &self.transactions,
            previous_hash: &self.block.previous_hash,
            nonce,
        })
    }
}

impl Block {
    /// Creates an unsealed candidate block stamped with the current time
    pub fn draft(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// The fixed first block of every chain
    pub fn genesis() -> Result<Self, HashError> {
        let mut block = Block {
            index: 0,
            timestamp: DateTime::<Utc>::default(),
            transactions: Vec::new(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn compute_hash(&self) -> Result<String, HashError> {
        self.hash_with_nonce(self.nonce)
    }

    /// Calculates the hash the block would have with a different nonce
    pub fn hash_with_nonce(&self, nonce: u64) -> Result<String, HashError> {
        self.header_template()?.hash_with_nonce(nonce)
    }

    /// Serializes the transactions once for repeated hashing
    pub fn header_template(&self) -> Result<HeaderTemplate<'_>, HashError> {
        let transactions = self
            .transactions
            .iter()
            .map(Transaction::canonical_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HeaderTemplate {
            block: self,
            transactions,
        })
    }

    /// Checks the cached hash against a difficulty in leading zero bits
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        hash::meets_difficulty(&self.hash, difficulty)
    }

    /// Fixes the proof of work found for this block
    pub fn seal(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }
}
