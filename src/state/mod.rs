//! State Management Module
//!
//! Account state lives behind the `AccountStore` trait: a transactional key-value store
//! with atomic multi-account read-modify-write. `MemoryStore` is the in-process
//! implementation used by the node and by tests.

mod accounts;
mod memory;
mod store;

pub use accounts::{register, stake, unstake};
pub use memory::MemoryStore;
pub use store::{AccountStore, AccountTxn};
