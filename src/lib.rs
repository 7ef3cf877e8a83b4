//! This crate implements a settlement engine for a campus digital-credit ledger.
//! Signed transfer requests are pooled, validated in rounds by a stake-weighted validator,
//! and recorded in an append-only hash-linked chain of blocks.

pub mod types; // Accounts, transfer requests, blocks and settlement reports.
pub mod error; // Error types for validation, storage and ledger operations.
pub mod config; // Defines and loads system configuration.
pub mod validation; // Signature verification and per-request validation rules.
pub mod state; // Transactional account store.
pub mod pool; // Pending transfer requests awaiting settlement.
pub mod selection; // Stake-weighted validator selection.
pub mod settlement; // Settlement rounds and the periodic settlement loop.
pub mod chain; // Append-only hash-linked block chain.
pub mod service; // Facade wiring the components together for the API.
pub mod api; // Handles external API definitions and interfaces.

#[cfg(test)]
mod test_support;

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use error::{LedgerError, StoreError, ValidationError};
pub use config::{Config, EmptyBlockPolicy, SettlementConfig};
pub use service::LedgerService;
