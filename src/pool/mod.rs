//! Transaction Pool Module
//!
//! This module holds signed transfer requests that have passed signature verification
//! and wait for the next settlement round.

mod tx_pool;

pub use tx_pool::TransactionPool;
