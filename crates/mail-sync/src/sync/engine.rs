//! Per-account sync engine
//!
//! One `SyncEngine` runs sync attempts for one account. Each attempt first
//! mirrors the label definitions, then runs either a full sync (no stored
//! cursor) or an incremental sync from the stored cursor. An expired cursor
//! falls back to a full sync within the same attempt.
//!
//! Write order within an attempt: fetch, upsert, retention cap, thread
//! derivation, cursor. Writes are not rolled back on failure or cancellation;
//! every individual write leaves the store consistent.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::delta::{MessageDelta, fold_history};
use super::threads::rederive_threads;
use super::{CursorExpiredError, SyncMode, SyncResult, determine_sync_mode};
use crate::config::SyncConfig;
use crate::gmail::api::{HistoryRecord, MessageRef};
use crate::gmail::{HistoryType, ListMessagesRequest, MailService, normalize_message};
use crate::models::{AccountId, Email, EmailId, Label, SyncState, SyncStatus, ThreadId};
use crate::storage::MailStore;

/// Tunables for one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum emails kept locally; the oldest are evicted beyond it
    pub retention_cap: usize,
    /// Page size of the first full-sync list call
    pub quick_sync_count: usize,
    /// Page size of later full-sync list calls
    pub page_size: usize,
    /// Ids per batch-get call
    pub batch_size: usize,
    /// Consume every history page, not just the first
    pub follow_history_pages: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncConfig::default().engine_options()
    }
}

/// Clears a cancellation request once the attempt it applied to is over
struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sync engine for one account
pub struct SyncEngine {
    account_id: AccountId,
    service: Arc<dyn MailService>,
    store: Arc<dyn MailStore>,
    options: SyncOptions,
    cancelled: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        account_id: AccountId,
        service: Arc<dyn MailService>,
        store: Arc<dyn MailStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            account_id,
            service,
            store,
            options,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Ask the running attempt to stop at its next iteration boundary
    ///
    /// With no attempt running, the request applies to the next one. The
    /// flag is cleared when that attempt ends.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run one sync attempt
    ///
    /// Any error marks the stored `SyncState` as errored with the message and
    /// is returned to the caller. Cursor expiry is not an error here: it is
    /// recovered by a full sync.
    pub async fn sync(&self) -> Result<SyncResult> {
        let _clear = ClearOnDrop(&self.cancelled);

        let mut state = self
            .store
            .get_sync_state(self.account_id)?
            .unwrap_or_else(|| SyncState::new(self.account_id));
        state.mark_syncing();
        self.store.save_sync_state(state.clone())?;

        match self.run(&mut state).await {
            Ok(result) => {
                self.store
                    .set_account_last_sync(self.account_id, Utc::now())?;
                info!(
                    "[SYNC] Account {} {:?} sync finished: {}{}",
                    self.account_id,
                    result.mode,
                    result.progress_message(),
                    if result.cancelled { " (cancelled)" } else { "" }
                );
                Ok(result)
            }
            Err(e) => {
                warn!("[SYNC] Account {} sync failed: {:#}", self.account_id, e);
                state.mark_error(format!("{:#}", e));
                if let Err(save_err) = self.store.save_sync_state(state) {
                    warn!(
                        "[SYNC] Account {} could not record sync error: {:#}",
                        self.account_id, save_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, state: &mut SyncState) -> Result<SyncResult> {
        self.sync_labels().await?;

        match determine_sync_mode(Some(state)) {
            SyncMode::Full => self.full_sync(state).await,
            SyncMode::Incremental => match self.incremental_sync(state).await {
                Err(e) if e.is::<CursorExpiredError>() => {
                    warn!(
                        "[SYNC] Account {}: {}, falling back to full sync",
                        self.account_id, e
                    );
                    self.full_sync(state).await
                }
                other => other,
            },
        }
    }

    /// Mirror remote label definitions; labels gone remotely are kept
    async fn sync_labels(&self) -> Result<usize> {
        let labels = self
            .service
            .list_labels()
            .await
            .context("Failed to list labels")?;

        let count = labels.len();
        for remote in labels {
            let is_system = remote.label_type.as_deref() == Some("system");
            let label = if is_system {
                Label::system(self.account_id, remote.id, remote.name)
            } else {
                Label::new(self.account_id, remote.id, remote.name)
            };
            self.store.upsert_label(
                label
                    .with_message_count(remote.messages_total.unwrap_or(0))
                    .with_unread_count(remote.messages_unread.unwrap_or(0)),
            )?;
        }
        debug!("[SYNC] Account {} mirrored {} labels", self.account_id, count);
        Ok(count)
    }

    /// Enumerate the mailbox from the newest message down to the retention cap
    async fn full_sync(&self, state: &mut SyncState) -> Result<SyncResult> {
        let cap = self.options.retention_cap;
        let mut result = SyncResult::new(SyncMode::Full);
        let mut touched: BTreeSet<ThreadId> = BTreeSet::new();

        // Phase 1: one quick page so the newest mail lands first
        info!("[SYNC] Account {} full sync: quick phase", self.account_id);
        let first = self
            .service
            .list_messages(ListMessagesRequest::page(
                self.options.quick_sync_count.min(cap),
                None,
            ))
            .await
            .context("Failed to list messages")?;
        let mut listed = self
            .store_page(first.messages.unwrap_or_default(), &mut result, &mut touched)
            .await?;
        let mut page_token = first.next_page_token;

        // Phase 2: the rest, up to the cap
        if page_token.is_some() && listed < cap {
            info!("[SYNC] Account {} full sync: extended phase", self.account_id);
        }
        while let Some(token) = page_token.take() {
            if listed >= cap {
                break;
            }
            if self.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let page = self
                .service
                .list_messages(ListMessagesRequest::page(
                    self.options.page_size.min(cap - listed),
                    Some(token),
                ))
                .await
                .context("Failed to list messages")?;
            listed += self
                .store_page(page.messages.unwrap_or_default(), &mut result, &mut touched)
                .await?;
            page_token = page.next_page_token;
        }

        self.enforce_retention_cap(&mut touched)?;
        rederive_threads(self.store.as_ref(), self.account_id, &touched)?;

        let email_count = self.store.count_emails(self.account_id)?;
        if result.cancelled {
            // No cursor: the next attempt starts a full sync again
            state.status = SyncStatus::Idle;
            state.email_count = email_count;
        } else {
            let profile = self
                .service
                .get_profile()
                .await
                .context("Failed to fetch profile")?;
            state.full_sync_completed(profile.history_id, email_count);
        }
        self.store.save_sync_state(state.clone())?;

        Ok(result)
    }

    /// Fetch and upsert one listed page in batches
    ///
    /// Returns how many refs were listed, whether or not they were stored.
    async fn store_page(
        &self,
        refs: Vec<MessageRef>,
        result: &mut SyncResult,
        touched: &mut BTreeSet<ThreadId>,
    ) -> Result<usize> {
        let ids: Vec<EmailId> = refs.iter().map(|r| EmailId::new(&r.id)).collect();

        for chunk in ids.chunks(self.options.batch_size.max(1)) {
            let batch = self.service.batch_get_messages(chunk).await;
            debug!(
                "[SYNC] Account {} batch: {} fetched, {} failed",
                self.account_id,
                batch.success_count(),
                batch.failure_count()
            );

            let (messages, failures) = batch.into_parts();
            for failure in &failures {
                warn!(
                    "[SYNC] Account {} failed to fetch message {}: {}",
                    self.account_id, failure.id, failure.error
                );
            }
            result.skipped += failures.len();

            for message in messages {
                match normalize_message(message, self.account_id) {
                    Ok(email) => self.upsert_email(email, result, touched)?,
                    Err(e) => {
                        warn!("[SYNC] Account {} {:#}", self.account_id, e);
                        result.skipped += 1;
                    }
                }
            }
        }

        Ok(ids.len())
    }

    fn upsert_email(
        &self,
        email: Email,
        result: &mut SyncResult,
        touched: &mut BTreeSet<ThreadId>,
    ) -> Result<()> {
        let existed = self.store.has_email(self.account_id, &email.id)?;
        touched.insert(email.thread_id.clone());
        self.store.upsert_email(email)?;

        if existed {
            result.updated += 1;
        } else {
            result.new += 1;
        }
        Ok(())
    }

    /// Apply the history recorded since the stored cursor
    async fn incremental_sync(&self, state: &mut SyncState) -> Result<SyncResult> {
        let cursor = state
            .cursor
            .clone()
            .context("Incremental sync requires a cursor")?;

        let (records, next_cursor) = self.fetch_history(&cursor).await?;
        let deltas = fold_history(&records);
        info!(
            "[SYNC] Account {} incremental sync: {} records, {} messages changed",
            self.account_id,
            records.len(),
            deltas.len()
        );

        let mut result = SyncResult::new(SyncMode::Incremental);
        let mut touched: BTreeSet<ThreadId> = BTreeSet::new();

        for (id, delta) in &deltas {
            if self.is_cancelled() {
                result.cancelled = true;
                break;
            }
            self.apply_delta(id, delta, &mut result, &mut touched)
                .await?;
        }

        self.enforce_retention_cap(&mut touched)?;
        rederive_threads(self.store.as_ref(), self.account_id, &touched)?;

        let email_count = self.store.count_emails(self.account_id)?;
        if result.cancelled {
            // Keep the old cursor so the unapplied records are replayed
            state.status = SyncStatus::Idle;
            state.email_count = email_count;
        } else {
            state.incremental_sync_completed(next_cursor, email_count);
        }
        self.store.save_sync_state(state.clone())?;

        Ok(result)
    }

    /// Collect history records after `cursor`, with the cursor to store next
    ///
    /// A not-found from the service means the cursor expired.
    async fn fetch_history(&self, cursor: &str) -> Result<(Vec<HistoryRecord>, String)> {
        let mut records = Vec::new();
        let mut latest: Option<String> = None;
        let mut page_token: Option<String> = None;

        loop {
            let response = match self
                .service
                .list_history(cursor, &HistoryType::ALL, page_token.as_deref())
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_not_found() => {
                    return Err(CursorExpiredError {
                        cursor: cursor.to_string(),
                    }
                    .into());
                }
                Err(e) => return Err(anyhow::Error::new(e).context("Failed to list history")),
            };

            records.extend(response.history.unwrap_or_default());
            latest = response.history_id.or(latest);
            page_token = response.next_page_token;

            if page_token.is_none() {
                break;
            }
            if !self.options.follow_history_pages || self.is_cancelled() {
                // Stopped early: resume after the last record consumed so the
                // next attempt picks up the remainder
                if let Some(last) = records.iter().rev().find(|r| !r.id.is_empty()) {
                    latest = Some(last.id.clone());
                }
                break;
            }
        }

        Ok((records, latest.unwrap_or_else(|| cursor.to_string())))
    }

    async fn apply_delta(
        &self,
        id: &EmailId,
        delta: &MessageDelta,
        result: &mut SyncResult,
        touched: &mut BTreeSet<ThreadId>,
    ) -> Result<()> {
        if delta.is_deleted {
            if let Some(email) = self.store.delete_email(self.account_id, id)? {
                touched.insert(email.thread_id);
                result.deleted += 1;
            }
            return Ok(());
        }

        if delta.needs_full_refetch {
            // The fetched copy already carries the current labels
            let message = match self.service.get_message(id).await {
                Ok(message) => message,
                Err(e) if e.is_not_found() => {
                    debug!("[SYNC] Message {} vanished before it could be fetched", id);
                    return Ok(());
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Failed to fetch message {}", id)));
                }
            };
            match normalize_message(message, self.account_id) {
                Ok(email) => self.upsert_email(email, result, touched)?,
                Err(e) => {
                    warn!("[SYNC] Account {} {:#}", self.account_id, e);
                    result.skipped += 1;
                }
            }
            return Ok(());
        }

        // Label-only change; unknown messages are outside the mirror
        let Some(mut email) = self.store.get_email(self.account_id, id)? else {
            debug!("[SYNC] Label change for unknown message {}, skipping", id);
            return Ok(());
        };
        if email.apply_label_changes(&delta.to_add, &delta.to_remove) {
            touched.insert(email.thread_id.clone());
            self.store.upsert_email(email)?;
            result.updated += 1;
        }
        Ok(())
    }

    /// Evict the oldest emails beyond the retention cap
    fn enforce_retention_cap(&self, touched: &mut BTreeSet<ThreadId>) -> Result<usize> {
        let count = self.store.count_emails(self.account_id)?;
        let cap = self.options.retention_cap;
        if count <= cap {
            return Ok(0);
        }

        let oldest = self.store.list_oldest_emails(self.account_id, count - cap)?;
        let ids: Vec<EmailId> = oldest.into_iter().map(|e| e.id).collect();
        let evicted = self.store.delete_emails(self.account_id, &ids)?;
        for email in &evicted {
            touched.insert(email.thread_id.clone());
        }

        info!(
            "[SYNC] Account {} evicted {} emails over the cap of {}",
            self.account_id,
            evicted.len(),
            cap
        );
        Ok(evicted.len())
    }
}
