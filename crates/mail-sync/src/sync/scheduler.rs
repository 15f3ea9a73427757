//! Background sync scheduler
//!
//! Runs one coordinator pass immediately on start, then one per interval,
//! in a tokio task until stopped.

use anyhow::Result;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{SyncCoordinator, SyncOutcome};
use crate::config::SyncConfig;
use crate::models::AccountId;

/// Shortest interval accepted; zero would spin
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Drives periodic `sync_all_accounts` passes
#[derive(Clone)]
pub struct SyncScheduler {
    coordinator: SyncCoordinator,
    interval: Arc<Mutex<Duration>>,
    running: Arc<AtomicBool>,
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    pub fn new(coordinator: SyncCoordinator, interval: Duration) -> Self {
        Self {
            coordinator,
            interval: Arc::new(Mutex::new(interval.max(MIN_INTERVAL))),
            running: Arc::new(AtomicBool::new(false)),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(coordinator: SyncCoordinator, config: &SyncConfig) -> Self {
        Self::new(coordinator, config.interval())
    }

    /// Start the background loop; a no-op returning false if already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        // Flag and handle change together under the handle lock
        let mut task_handle = locked(&self.task_handle);
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("[SCHED] Already running");
            return false;
        }

        let interval = self.interval();
        let coordinator = self.coordinator.clone();
        *task_handle = Some(tokio::spawn(Self::scheduler_loop(coordinator, interval)));

        info!("[SCHED] Background sync started (interval: {:?})", interval);
        true
    }

    /// Stop the background loop; a no-op returning false if not running
    ///
    /// Account syncs already in flight run to completion.
    pub fn stop(&self) -> bool {
        let mut task_handle = locked(&self.task_handle);
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        if let Some(handle) = task_handle.take() {
            handle.abort();
        }

        info!("[SCHED] Background sync stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        *locked(&self.interval)
    }

    /// Change the cadence; a running loop restarts so it applies immediately
    pub fn update_interval(&self, interval: Duration) {
        *locked(&self.interval) = interval.max(MIN_INTERVAL);
        info!("[SCHED] Interval updated to {:?}", self.interval());

        if self.stop() {
            self.start();
        }
    }

    /// Run one pass now without touching the schedule
    pub async fn trigger_immediate_sync(&self) -> Result<Vec<(AccountId, SyncOutcome)>> {
        info!("[SCHED] Immediate sync requested");
        self.coordinator.sync_all_accounts().await
    }

    async fn scheduler_loop(coordinator: SyncCoordinator, interval: Duration) {
        loop {
            match coordinator.sync_all_accounts().await {
                Ok(outcomes) => {
                    let failed = outcomes
                        .iter()
                        .filter(|(_, o)| matches!(o, SyncOutcome::Failed(_)))
                        .count();
                    debug!(
                        "[SCHED] Pass finished: {} accounts, {} failed",
                        outcomes.len(),
                        failed
                    );
                }
                Err(e) => error!("[SCHED] Sync pass failed: {:#}", e),
            }

            tokio::time::sleep(interval).await;
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        // Last clone going away takes the loop with it
        if Arc::strong_count(&self.task_handle) == 1 {
            self.stop();
        }
    }
}
