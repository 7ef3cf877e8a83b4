use super::store::{AccountStore, AccountTxn};
use crate::{Account, AccountId, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// In-memory account store with per-account locking
///
/// The outer map lock is held only to look records up or insert new ones. Transactions
/// lock the individual records they name, always in sorted id order, so transactions over
/// overlapping account sets serialize while disjoint ones run in parallel.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let map = accounts
            .into_iter()
            .map(|a| (a.id.clone(), Arc::new(Mutex::new(a))))
            .collect();
        Self {
            accounts: RwLock::new(map),
        }
    }

    fn cells(&self, ids: &[&str]) -> Result<Vec<Arc<Mutex<Account>>>, StoreError> {
        let map = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
        ids.iter()
            .map(|id| {
                map.get(*id)
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownAccount(id.to_string()))
            })
            .collect()
    }
}

impl AccountStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Account, StoreError> {
        let cell = self.cells(&[id])?.remove(0);
        let account = cell.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(account.clone())
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let cells: Vec<_> = {
            let map = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
            map.values().cloned().collect()
        };
        let mut accounts = cells
            .iter()
            .map(|cell| cell.lock().map(|a| a.clone()).map_err(|_| StoreError::Poisoned))
            .collect::<Result<Vec<_>, _>>()?;
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    fn insert(&self, account: Account) -> Result<(), StoreError> {
        let mut map = self.accounts.write().map_err(|_| StoreError::Poisoned)?;
        if map.contains_key(&account.id) {
            return Err(StoreError::AccountExists(account.id));
        }
        map.insert(account.id.clone(), Arc::new(Mutex::new(account)));
        Ok(())
    }

    fn transact<R, F>(&self, ids: &[&str], f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut AccountTxn) -> R,
    {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let cells = self.cells(&ids)?;
        let mut guards = cells
            .iter()
            .map(|cell| cell.lock().map_err(|_| StoreError::Poisoned))
            .collect::<Result<Vec<_>, _>>()?;

        let mut txn = AccountTxn::new(guards.iter().map(|guard| (**guard).clone()));
        let result = f(&mut txn);

        for updated in txn.into_writes() {
            if let Some(guard) = guards.iter_mut().find(|g| g.id == updated.id) {
                **guard = updated;
            }
        }
        Ok(result)
    }
}
