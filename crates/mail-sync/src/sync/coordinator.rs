//! Multi-account sync coordination
//!
//! Fans sync attempts out across enabled accounts, one tokio task per
//! account, while `SyncLock` keeps attempts for the same account strictly
//! one at a time. Engines are created lazily and cached per account.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{error, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::Semaphore;

use super::{SyncEngine, SyncLock, SyncOptions, SyncOutcome, SyncProgress};
use crate::config::SyncConfig;
use crate::gmail::MailService;
use crate::models::{Account, AccountId};
use crate::storage::MailStore;

/// Builds the mail service an account's engine talks to
pub type ServiceFactory = Arc<dyn Fn(&Account) -> Result<Arc<dyn MailService>> + Send + Sync>;

struct Inner {
    store: Arc<dyn MailStore>,
    services: ServiceFactory,
    options: SyncOptions,
    lock: SyncLock,
    engines: Mutex<HashMap<AccountId, Arc<SyncEngine>>>,
    progress: RwLock<HashMap<AccountId, SyncProgress>>,
    /// Number of `sync_all_accounts` passes in flight
    passes: AtomicUsize,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    /// Bounds concurrent account syncs when configured
    limiter: Option<Semaphore>,
}

/// Runs sync attempts for every account
///
/// Cheap to clone; clones share engines, progress and the per-account lock.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

/// Counts one `sync_all_accounts` pass for as long as it is alive
///
/// Dropped on completion and also when the pass future is dropped early
/// (e.g. an aborted scheduler loop), so `is_syncing` cannot stick.
struct PassGuard<'a> {
    passes: &'a AtomicUsize,
}

impl<'a> PassGuard<'a> {
    fn new(passes: &'a AtomicUsize) -> Self {
        passes.fetch_add(1, Ordering::SeqCst);
        Self { passes }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.passes.fetch_sub(1, Ordering::SeqCst);
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    /// * `store` - Record store shared by every account
    /// * `services` - Builds the mail service for an account on first sync
    /// * `config` - Engine options and the optional concurrency bound
    pub fn new<F>(store: Arc<dyn MailStore>, services: F, config: &SyncConfig) -> Self
    where
        F: Fn(&Account) -> Result<Arc<dyn MailService>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                store,
                services: Arc::new(services),
                options: config.engine_options(),
                lock: SyncLock::new(),
                engines: Mutex::new(HashMap::new()),
                progress: RwLock::new(HashMap::new()),
                passes: AtomicUsize::new(0),
                last_sync_at: Mutex::new(None),
                limiter: config
                    .max_concurrent_accounts
                    .map(|n| Semaphore::new(n.max(1))),
            }),
        }
    }

    /// Sync every enabled account concurrently and wait for all of them
    ///
    /// Per-account failures are reported in the outcomes, not as an error.
    pub async fn sync_all_accounts(&self) -> Result<Vec<(AccountId, SyncOutcome)>> {
        let accounts = self.inner.store.list_enabled_accounts()?;
        info!("[SYNC] Syncing {} accounts", accounts.len());

        let _pass = PassGuard::new(&self.inner.passes);
        let tasks: Vec<_> = accounts
            .into_iter()
            .map(|account| {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let outcome = coordinator.sync_account(&account).await;
                    (account.id, outcome)
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("[SYNC] Account sync task panicked: {}", e),
            }
        }

        *locked(&self.inner.last_sync_at) = Some(Utc::now());
        Ok(outcomes)
    }

    /// Sync one account unless an attempt for it is already running
    ///
    /// A denied attempt returns `SyncOutcome::Skipped` and leaves progress
    /// untouched. The per-account lock is released on every path.
    pub async fn sync_account(&self, account: &Account) -> SyncOutcome {
        let Some(_guard) = self.inner.lock.guard(account.id) else {
            info!(
                "[SYNC] Account {} ({}) already syncing, skipping",
                account.id, account.email
            );
            return SyncOutcome::Skipped;
        };

        let _permit = match &self.inner.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        self.set_progress(account.id, SyncProgress::syncing());

        let outcome = match self.engine_for(account) {
            Ok(engine) => match engine.sync().await {
                Ok(result) => {
                    self.set_progress(account.id, SyncProgress::completed(&result));
                    SyncOutcome::Completed(result)
                }
                Err(e) => SyncOutcome::Failed(format!("{:#}", e)),
            },
            Err(e) => SyncOutcome::Failed(format!("{:#}", e)),
        };

        if let SyncOutcome::Failed(message) = &outcome {
            error!("[SYNC] Account {} ({}) sync failed: {}", account.id, account.email, message);
            self.set_progress(account.id, SyncProgress::error(message.clone()));
        }
        outcome
    }

    /// On-demand sync of one account
    pub async fn trigger_sync(&self, account: &Account) -> SyncOutcome {
        self.sync_account(account).await
    }

    /// Ask the account's running engine to stop; false if it has no engine
    pub fn cancel_sync(&self, account_id: AccountId) -> bool {
        match locked(&self.inner.engines).get(&account_id) {
            Some(engine) => {
                info!("[SYNC] Cancelling sync for account {}", account_id);
                engine.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get_progress(&self, account_id: AccountId) -> Option<SyncProgress> {
        self.inner
            .progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&account_id)
            .cloned()
    }

    /// Drop cached engines; the next sync of each account builds a fresh one
    pub fn clear_engine_cache(&self) {
        locked(&self.inner.engines).clear();
    }

    pub fn cached_engine_count(&self) -> usize {
        locked(&self.inner.engines).len()
    }

    /// True while any `sync_all_accounts` pass is running
    pub fn is_syncing(&self) -> bool {
        self.inner.passes.load(Ordering::SeqCst) > 0
    }

    pub fn is_account_syncing(&self, account_id: AccountId) -> bool {
        self.inner.lock.is_locked(account_id)
    }

    /// When the last `sync_all_accounts` pass finished
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *locked(&self.inner.last_sync_at)
    }

    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.inner.store
    }

    fn set_progress(&self, account_id: AccountId, progress: SyncProgress) {
        self.inner
            .progress
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account_id, progress);
    }

    fn engine_for(&self, account: &Account) -> Result<Arc<SyncEngine>> {
        let mut engines = locked(&self.inner.engines);
        if let Some(engine) = engines.get(&account.id) {
            return Ok(Arc::clone(engine));
        }

        let service = (self.inner.services)(account)?;
        let engine = Arc::new(SyncEngine::new(
            account.id,
            service,
            Arc::clone(&self.inner.store),
            self.inner.options.clone(),
        ));
        engines.insert(account.id, Arc::clone(&engine));
        Ok(engine)
    }
}
