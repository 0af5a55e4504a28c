use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in the chain, starting at 0
    pub index: u64,

    /// Unix seconds when the block was sealed
    pub timestamp: f64,

    /// Transactions sealed in this block, in admission order
    pub transactions: Vec<Transaction>,

    /// Identifier of the node that produced the block
    pub miner: String,

    /// Canonical content hash, see [`Block::calculate_hash`]
    pub hash: String,
}

impl Block {
    /// Seals a new block stamped with the current time
    pub fn new(index: u64, transactions: Vec<Transaction>, miner: String) -> Self {
        Self::with_timestamp(index, super::unix_now(), transactions, miner)
    }

    pub fn with_timestamp(index: u64, timestamp: f64, transactions: Vec<Transaction>, miner: String) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            miner,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The canonical encoding hashed for the block: compact JSON of every
    /// field except `hash`, with object keys sorted at every level.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let body = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "miner": self.miner,
        });

        super::canonical_json(&body).into_bytes()
    }

    /// Hex SHA-256 of [`Block::canonical_bytes`]
    pub fn calculate_hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    /// Whether the declared hash matches the content
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}
