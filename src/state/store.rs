//! Transactional account store contract
//!
//! The settlement engine never touches account records directly. It asks the store to run
//! a closure over a consistent snapshot of a named set of accounts and to commit the
//! closure's writes as one unit, serialized against every other transaction that names
//! any of the same accounts.

use crate::{Account, AccountId, StoreError};
use std::collections::{BTreeMap, BTreeSet};

/// Multi-record read-modify-write store
pub trait AccountStore: Send + Sync {
    /// Snapshot of one account
    fn get(&self, id: &str) -> Result<Account, StoreError>;

    /// Snapshot of every account, ordered by id
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Create a new account; fails if the id is taken
    fn insert(&self, account: Account) -> Result<(), StoreError>;

    /// Run `f` over the named accounts and commit whatever it wrote, atomically.
    ///
    /// Fails with `UnknownAccount` before running `f` if any id is missing. The closure
    /// commits by mutating through [`AccountTxn::get_mut`]; leaving the transaction
    /// untouched commits nothing.
    fn transact<R, F>(&self, ids: &[&str], f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut AccountTxn) -> R;

    /// Accounts currently eligible to validate
    fn validators(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .accounts()?
            .into_iter()
            .filter(Account::is_validator)
            .collect())
    }
}

/// Staged view of the accounts locked by one transaction
#[derive(Debug, Default)]
pub struct AccountTxn {
    accounts: BTreeMap<AccountId, Account>,
    dirty: BTreeSet<AccountId>,
}

impl AccountTxn {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Mutable access; the account is written back on commit
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Account> {
        let account = self.accounts.get_mut(id)?;
        self.dirty.insert(account.id.clone());
        Some(account)
    }

    /// Accounts that were touched, consumed on commit
    pub fn into_writes(mut self) -> Vec<Account> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|id| self.accounts.remove(&id))
            .collect()
    }
}
