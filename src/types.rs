use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Opaque account identity, supplied by the auth layer
pub type AccountId = String;

/// Account state
///
/// `is_validator` is not stored; it is derived from `staked_balance` so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// secp256k1 verification key, hex encoded
    pub public_key: String,
    pub balance: u64,
    pub staked_balance: u64,
    pub nonce: u64,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, public_key: impl Into<String>, balance: u64) -> Self {
        Self {
            id: id.into(),
            public_key: public_key.into(),
            balance,
            staked_balance: 0,
            nonce: 0,
        }
    }

    pub fn is_validator(&self) -> bool {
        self.staked_balance > 0
    }

    /// Spendable plus staked credit
    pub fn total_credit(&self) -> u128 {
        u128::from(self.balance) + u128::from(self.staked_balance)
    }
}

/// The exact payload a user signs
///
/// Unknown fields are rejected: anything the signer covered must be something the
/// verifier re-serializes, otherwise the canonical bytes differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferMessage {
    #[serde(rename = "recipientId")]
    pub recipient_id: AccountId,
    pub amount: u64,
    pub nonce: u64,
}

/// Wire-level transfer submission: `{ message: {...}, signature: "<hex r||s>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSubmission {
    pub message: TransferMessage,
    pub signature: String,
}

/// A signed transfer accepted into the pool
///
/// `id` is the pool arrival sequence number. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: u64,
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: u64,
    pub nonce: u64,
    pub message: TransferMessage,
    pub signature: String,
    pub submitted_at: u64,
}

/// Block of settled transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Unix milliseconds
    pub timestamp: u64,
    pub transactions: Vec<TransferRequest>,
    pub validator_id: AccountId,
    pub previous_hash: String,
    pub hash: String,
}

/// Lifecycle of a transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Validated,
    Failed { reason: ValidationError },
}

/// What happened to one request during a settlement round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub request_id: u64,
    pub sender_id: AccountId,
    pub nonce: u64,
    #[serde(flatten)]
    pub status: RequestStatus,
}

impl SettlementOutcome {
    pub fn is_validated(&self) -> bool {
        matches!(self.status, RequestStatus::Validated)
    }

    pub fn failure(&self) -> Option<&ValidationError> {
        match &self.status {
            RequestStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Result of a completed settlement round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub validator_id: AccountId,
    /// `None` when nothing validated and empty blocks are skipped
    pub block: Option<Block>,
    pub outcomes: Vec<SettlementOutcome>,
    pub reward_minted: u64,
}

impl SettlementReport {
    pub fn validated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_validated()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.validated_count()
    }
}

/// A transfer as seen in an account's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub request: TransferRequest,
    pub status: HistoryStatus,
    /// Index of the settling block, if settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Validated,
}

/// One page of results plus the total count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
