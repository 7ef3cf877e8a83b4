//! Chain Ledger Module
//!
//! Append-only sequence of hash-linked blocks:
//! - Block sealing: index, linkage and SHA-256 hash over canonical block contents
//! - ChainLedger: lazily created genesis, guarded append, integrity audit, paginated reads

mod block;
mod ledger;

pub use block::{GENESIS_PREVIOUS_HASH, GENESIS_VALIDATOR};
pub use ledger::ChainLedger;
