//! Validator Selection Module
//!
//! Stake-weighted random choice of the account that produces the next block.
//! Only accounts with positive stake are eligible; an account's chance is proportional
//! to its share of the total stake.

mod selector;


pub use selector::{ValidatorSelector, eligible};
