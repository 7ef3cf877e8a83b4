//! Error Types
//!
//! Three layers of failure:
//! - `ValidationError`: a single transfer request failed at settlement time. Terminal for
//!   that request, never fatal to the round. Recorded in the round's outcome list.
//! - `StoreError`: the transactional account store could not complete an operation.
//! - `LedgerError`: everything a caller of the ledger can see.

use crate::{AccountId, SettlementReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-request settlement failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("transfer amount must be positive")]
    ZeroAmount,
    #[error("{account} cannot transfer to itself")]
    SelfTransfer { account: AccountId },
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("unknown account {account}")]
    UnknownAccount { account: AccountId },
    #[error("credit to {account} would overflow its balance")]
    BalanceOverflow { account: AccountId },
}

/// Transactional account store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("account {0} already exists")]
    AccountExists(AccountId),
    #[error("account store lock poisoned")]
    Poisoned,
}

/// Caller-facing ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Submission rejected before entering the pool
    #[error("invalid transaction signature")]
    InvalidSignature,
    /// Malformed request that never reaches the pool (zero amount, self transfer, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("insufficient staked balance: required {required}, staked {staked}")]
    InsufficientStake { required: u64, staked: u64 },
    /// Whole-round failure, nothing changed
    #[error("no validator available to settle the pool")]
    NoValidatorAvailable,
    /// Broken linkage or index; appends stop until resumed
    #[error("chain integrity violation: {0}")]
    ChainIntegrityViolation(String),
    #[error(transparent)]
    Store(StoreError),
    /// Transfers were applied but the round stopped before it finished recording them.
    /// `report` lists every outcome of the round; `report.block` is set only if the
    /// block was appended.
    #[error("settlement round incomplete: {source}")]
    RoundIncomplete {
        report: Box<SettlementReport>,
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    /// Whether retrying the same call later can succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NoValidatorAvailable)
    }

    /// Whether the chain is halted behind this error
    pub fn is_chain_halt(&self) -> bool {
        match self {
            LedgerError::ChainIntegrityViolation(_) => true,
            LedgerError::RoundIncomplete { source, .. } => source.is_chain_halt(),
            _ => false,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownAccount(id) => LedgerError::UnknownAccount(id),
            other => LedgerError::Store(other),
        }
    }
}
