use crate::{AccountId, Block, TransferRequest, validation::canonical_bytes};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// `validator_id` recorded on the genesis block
pub const GENESIS_VALIDATOR: &str = "genesis";

/// Everything the block hash covers: the block minus its own hash
#[derive(Serialize)]
struct BlockContents<'a> {
    index: u64,
    timestamp: u64,
    transactions: &'a [TransferRequest],
    validator_id: &'a str,
    previous_hash: &'a str,
}

impl Block {
    /// The synthetic first block
    pub fn genesis(timestamp: u64) -> Self {
        Self::seal(0, timestamp, Vec::new(), GENESIS_VALIDATOR.to_string(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Block extending `previous`
    pub fn next(
        previous: &Block,
        timestamp: u64,
        transactions: Vec<TransferRequest>,
        validator_id: AccountId,
    ) -> Self {
        Self::seal(
            previous.index + 1,
            timestamp,
            transactions,
            validator_id,
            previous.hash.clone(),
        )
    }

    fn seal(
        index: u64,
        timestamp: u64,
        transactions: Vec<TransferRequest>,
        validator_id: AccountId,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            validator_id,
            previous_hash,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Lowercase hex SHA-256 of the canonical serialization, excluding `hash`
    pub fn compute_hash(&self) -> String {
        let contents = BlockContents {
            index: self.index,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            validator_id: &self.validator_id,
            previous_hash: &self.previous_hash,
        };
        // Plain structs, strings and integers cannot fail to serialize.
        let bytes = canonical_bytes(&contents).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Stored hash matches the contents
    pub fn is_sealed(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}
