//! Validator Selector
//!
//! # Algorithm
//! 1. Keep accounts with `staked_balance > 0`, ordered by id
//! 2. Draw `p` uniformly from `[0, total_stake)`
//! 3. Scan, accumulating stake; the first account whose running total exceeds `p` wins
//!
//! With integer stakes and integer `p`, "running total > p" gives each account exactly
//! `stake / total_stake` probability. The scan is linear; a prefix-sum table with binary
//! search would select identically for large validator sets.

use crate::Account;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

/// Accounts allowed to validate, in the fixed order the scan uses
pub fn eligible(accounts: &[Account]) -> Vec<&Account> {
    let mut eligible: Vec<&Account> = accounts.iter().filter(|a| a.is_validator()).collect();
    eligible.sort_by(|a, b| a.id.cmp(&b.id));
    eligible
}

/// Stake-weighted validator selector
///
/// Owns its random source so every round takes an independent draw. Seeded construction
/// makes selection reproducible in tests.
pub struct ValidatorSelector {
    rng: Mutex<StdRng>,
}

impl ValidatorSelector {
    /// Selector seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick the next block's validator, or `None` if nobody has stake
    pub fn select(&self, accounts: &[Account]) -> Option<Account> {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::select_with(accounts, &mut *rng).cloned()
    }

    /// Selection with an explicit random source
    pub fn select_with<'a, R: Rng + ?Sized>(accounts: &'a [Account], rng: &mut R) -> Option<&'a Account> {
        let eligible = eligible(accounts);
        if eligible.is_empty() {
            return None;
        }

        let total_stake: u128 = eligible.iter().map(|a| u128::from(a.staked_balance)).sum();
        if total_stake == 0 {
            return eligible.choose(rng).copied();
        }

        let point = rng.gen_range(0..total_stake);
        let mut cumulative = 0u128;
        for account in &eligible {
            cumulative += u128::from(account.staked_balance);
            if cumulative > point {
                debug!(
                    "Selected validator {} (stake {}/{}, draw {})",
                    account.id, account.staked_balance, total_stake, point
                );
                return Some(*account);
            }
        }
        None
    }
}

impl Default for ValidatorSelector {
    fn default() -> Self {
        Self::new()
    }
}
