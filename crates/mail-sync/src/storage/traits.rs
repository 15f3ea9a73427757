//! Storage trait definitions

use crate::models::{Account, AccountId, Email, EmailId, EmailThread, Label, SyncState, ThreadId};
use anyhow::Result;

/// Trait for mail storage operations
///
/// Every email, thread, label and sync-state operation is scoped by account
/// id, so concurrent account syncs never touch each other's rows even when
/// they share one store.
pub trait MailStore: Send + Sync {
    // === Accounts ===

    /// Insert or update an account
    ///
    /// An account with id 0 is assigned the next free id. Returns the stored id.
    fn upsert_account(&self, account: Account) -> Result<AccountId>;

    fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// List all accounts, ordered by id
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// List accounts with `enabled` set, ordered by id
    fn list_enabled_accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .list_accounts()?
            .into_iter()
            .filter(|a| a.enabled)
            .collect())
    }

    /// Stamp the account's last successful sync time
    fn set_account_last_sync(
        &self,
        id: AccountId,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()>;

    // === Emails ===

    /// Insert or update an email, keyed by (account, remote id)
    fn upsert_email(&self, email: Email) -> Result<()>;

    fn get_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>>;

    fn has_email(&self, account_id: AccountId, id: &EmailId) -> Result<bool> {
        Ok(self.get_email(account_id, id)?.is_some())
    }

    /// Delete an email, returning it if it existed
    fn delete_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>>;

    /// Delete many emails, returning the ones that existed
    fn delete_emails(&self, account_id: AccountId, ids: &[EmailId]) -> Result<Vec<Email>> {
        let mut deleted = Vec::new();
        for id in ids {
            if let Some(email) = self.delete_email(account_id, id)? {
                deleted.push(email);
            }
        }
        Ok(deleted)
    }

    /// List emails in a thread, ordered by received_at ascending
    fn list_emails_for_thread(&self, account_id: AccountId, thread_id: &ThreadId)
    -> Result<Vec<Email>>;

    /// List emails carrying a label, ordered by received_at descending
    fn list_emails_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Email>>;

    /// List the oldest emails of an account, ordered by received_at ascending
    fn list_oldest_emails(&self, account_id: AccountId, limit: usize) -> Result<Vec<Email>>;

    fn count_emails(&self, account_id: AccountId) -> Result<usize>;

    // === Threads ===

    fn upsert_thread(&self, thread: EmailThread) -> Result<()>;

    fn get_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<Option<EmailThread>>;

    fn delete_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<()>;

    /// List threads, ordered by last_message_at descending
    fn list_threads(&self, account_id: AccountId, limit: usize, offset: usize)
    -> Result<Vec<EmailThread>>;

    /// List threads that have at least one email with the given label
    /// Returns threads ordered by last_message_at descending
    fn list_threads_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EmailThread>>;

    fn count_threads(&self, account_id: AccountId) -> Result<usize>;

    // === Labels ===

    /// Insert or update a label, keyed by (account, remote label id)
    fn upsert_label(&self, label: Label) -> Result<()>;

    /// List labels, ordered by id
    fn list_labels(&self, account_id: AccountId) -> Result<Vec<Label>>;

    // === Sync state ===

    fn get_sync_state(&self, account_id: AccountId) -> Result<Option<SyncState>>;

    /// Save sync state (upsert)
    fn save_sync_state(&self, state: SyncState) -> Result<()>;

    fn delete_sync_state(&self, account_id: AccountId) -> Result<()>;
}
