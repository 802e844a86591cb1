use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::Error;

/// An account snapshot: a balance keyed by a unique identifier.
///
/// Accounts are exchanged by value everywhere. The store hands out clones and
/// takes replacements; callers never hold a reference into the store's
/// internal state.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub balance: Decimal,
}

impl Account {
    pub fn new(id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    pub fn has_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Returns a new snapshot with `amount` added to the balance.
    pub fn credit(&self, amount: Decimal) -> Result<Account, Error> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidAccountChange(amount));
        }
        Ok(Account::new(self.id.clone(), self.balance + amount))
    }

    /// Returns a new snapshot with `amount` subtracted from the balance.
    pub fn debit(&self, amount: Decimal) -> Result<Account, Error> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidAccountChange(amount));
        }
        if !self.has_funds(amount) {
            return Err(Error::InsufficientFunds {
                account: self.id.clone(),
                balance: self.balance,
                amount,
            });
        }
        Ok(Account::new(self.id.clone(), self.balance - amount))
    }
}

struct Slot {
    account: Account,
    lock: Arc<Mutex<()>>,
}

/// Exclusive access to one account, returned by [`AccountsStore::lock`].
///
/// Holding the guard is what authorizes [`AccountsStore::update`] for the
/// matching identifier; dropping it releases the account. Guards held by a
/// single caller are dropped in reverse declaration order, so releasing
/// happens in reverse order of acquisition without any explicit unlock call.
#[derive(Debug)]
#[must_use = "dropping the lock releases the account"]
pub struct AccountLock {
    id: String,
    _guard: OwnedMutexGuard<()>,
}

impl AccountLock {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Thread-safe in-memory registry of accounts with per-account exclusive
/// locks.
///
/// Each account's lock is independent; there is no global lock, so transfers
/// over disjoint account pairs proceed fully in parallel. The per-account
/// mutex is a tokio mutex, which queues waiters FIFO, so a blocked `lock`
/// call cannot starve.
#[derive(Default)]
pub struct AccountsStore {
    accounts: DashMap<String, Slot>,
}

impl AccountsStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Stores a new account. Fails if the identifier is already taken.
    /// A single atomic insert-if-absent; no lock is involved.
    pub fn create(&self, account: Account) -> Result<(), Error> {
        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateAccount(account.id)),
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    account,
                    lock: Arc::new(Mutex::new(())),
                });
                Ok(())
            }
        }
    }

    /// Returns a snapshot of the account, or `None` if unknown.
    ///
    /// Does not take the per-account lock: reads outside the lock discipline
    /// are best-effort and not linearizable with an in-flight transfer. This
    /// is intentional; `get` exists for observation, not mutation.
    pub fn get(&self, id: &str) -> Option<Account> {
        self.accounts.get(id).map(|slot| slot.account.clone())
    }

    /// Snapshots every account, with the same best-effort consistency as
    /// [`get`](Self::get).
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|slot| slot.account.clone())
            .collect()
    }

    /// Blocks until exclusive access to the account is acquired, then
    /// returns the current snapshot together with the lock guard.
    ///
    /// Fails with [`Error::AccountNotFound`] before attempting to acquire:
    /// locking a nonexistent account is a programming error, not a wait.
    pub async fn lock(&self, id: &str) -> Result<(Account, AccountLock), Error> {
        // Clone the lock handle out of the map entry so that no map guard is
        // held across the await below.
        let lock = self
            .accounts
            .get(id)
            .map(|slot| Arc::clone(&slot.lock))
            .ok_or_else(|| Error::AccountNotFound(id.to_owned()))?;

        let guard = lock.lock_owned().await;

        // Re-read after acquisition: the snapshot must reflect the last
        // committed update, not the state at lookup time.
        let account = self
            .get(id)
            .ok_or_else(|| Error::AccountNotFound(id.to_owned()))?;

        Ok((
            account,
            AccountLock {
                id: id.to_owned(),
                _guard: guard,
            },
        ))
    }

    /// Replaces the stored snapshot for the account's identifier and returns
    /// the new stored value, or `None` if the identifier no longer exists.
    ///
    /// The guard argument is the lock discipline: `update` is unreachable
    /// without first going through [`lock`](Self::lock). The guard's
    /// identifier is expected to match the account being written.
    pub fn update(&self, lock: &AccountLock, account: Account) -> Option<Account> {
        debug_assert_eq!(lock.id(), account.id);
        let mut slot = self.accounts.get_mut(&account.id)?;
        slot.account = account;
        Some(slot.account.clone())
    }

    /// Removes all accounts.
    ///
    /// Not safe under concurrent load: it does not wait for held locks to
    /// release. Intended only as a test-harness reset.
    pub fn clear(&self) {
        self.accounts.clear();
    }
}
