//! Per-account single-flight admission control

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::AccountId;

/// Registry of accounts with a sync attempt in flight
///
/// `acquire` is an atomic check-and-set under one mutex; it never waits.
#[derive(Debug, Default)]
pub struct SyncLock {
    active: Mutex<HashSet<AccountId>>,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashSet<AccountId>> {
        // The set stays valid even if a holder panicked mid-insert
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the account busy
    ///
    /// Returns false, with no effect, if it was already busy.
    pub fn acquire(&self, account_id: AccountId) -> bool {
        self.active().insert(account_id)
    }

    /// Clear the busy mark; a no-op if not held
    pub fn release(&self, account_id: AccountId) {
        self.active().remove(&account_id);
    }

    pub fn is_locked(&self, account_id: AccountId) -> bool {
        self.active().contains(&account_id)
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    /// Acquire and return a guard that releases on drop
    pub fn guard(&self, account_id: AccountId) -> Option<SyncLockGuard<'_>> {
        self.acquire(account_id).then_some(SyncLockGuard {
            lock: self,
            account_id,
        })
    }
}

/// Holds one account's busy mark until dropped
#[derive(Debug)]
pub struct SyncLockGuard<'a> {
    lock: &'a SyncLock,
    account_id: AccountId,
}

impl SyncLockGuard<'_> {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

impl Drop for SyncLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.account_id);
    }
}
