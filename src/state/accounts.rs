//! Account lifecycle operations outside settlement: registration and staking.
//!
//! Stake changes go through [`AccountStore::transact`] exactly like transfers, so a stake
//! and a concurrent settlement of the same account never interleave.

use super::store::AccountStore;
use crate::{Account, LedgerError, StoreError, validation::parse_public_key_hex};
use tracing::info;

/// Create an account with the configured starting balance
pub fn register<S: AccountStore>(
    store: &S,
    id: &str,
    public_key: &str,
    initial_balance: u64,
) -> Result<Account, LedgerError> {
    if id.is_empty() {
        return Err(LedgerError::InvalidRequest("account id must not be empty".into()));
    }
    if parse_public_key_hex(public_key).is_none() {
        return Err(LedgerError::InvalidRequest("public key is not a secp256k1 point".into()));
    }

    let account = Account::new(id, public_key, initial_balance);
    store.insert(account.clone()).map_err(|err| match err {
        StoreError::AccountExists(id) => {
            LedgerError::InvalidRequest(format!("account {id} already exists"))
        }
        other => other.into(),
    })?;
    info!("Registered account {} with balance {}", id, initial_balance);
    Ok(account)
}

/// Lock `amount` of spendable balance as stake
pub fn stake<S: AccountStore>(store: &S, id: &str, amount: u64) -> Result<Account, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidRequest("stake amount must be positive".into()));
    }

    let updated = store.transact(&[id], |txn| {
        let account = txn
            .get(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.to_string()))?;
        if account.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: account.balance,
            });
        }
        let Some(staked) = account.staked_balance.checked_add(amount) else {
            return Err(LedgerError::InvalidRequest("stake overflow".into()));
        };
        let account = txn
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.to_string()))?;
        account.balance -= amount;
        account.staked_balance = staked;
        Ok(account.clone())
    })??;

    info!("{} staked {} (total stake {})", id, amount, updated.staked_balance);
    Ok(updated)
}

/// Release `amount` of stake back to spendable balance
pub fn unstake<S: AccountStore>(store: &S, id: &str, amount: u64) -> Result<Account, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidRequest("unstake amount must be positive".into()));
    }

    let updated = store.transact(&[id], |txn| {
        let account = txn
            .get(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.to_string()))?;
        if account.staked_balance < amount {
            return Err(LedgerError::InsufficientStake {
                required: amount,
                staked: account.staked_balance,
            });
        }
        let Some(balance) = account.balance.checked_add(amount) else {
            return Err(LedgerError::InvalidRequest("balance overflow".into()));
        };
        let account = txn
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.to_string()))?;
        account.staked_balance -= amount;
        account.balance = balance;
        Ok(account.clone())
    })??;

    info!(
        "{} unstaked {} (remaining stake {}, validator: {})",
        id,
        amount,
        updated.staked_balance,
        updated.is_validator()
    );
    Ok(updated)
}
