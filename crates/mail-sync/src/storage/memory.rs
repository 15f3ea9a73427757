//! In-memory storage implementation
//!
//! Used by the test suites and for offline runs of the sync stack.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use super::MailStore;
use crate::models::{Account, AccountId, Email, EmailId, EmailThread, Label, SyncState, ThreadId};

/// In-memory implementation of MailStore
///
/// Uses maps protected by RwLocks for thread-safe access. Rows are keyed by
/// (account id, remote id).
pub struct InMemoryMailStore {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
    emails: RwLock<HashMap<(AccountId, EmailId), Email>>,
    threads: RwLock<HashMap<(AccountId, ThreadId), EmailThread>>,
    labels: RwLock<BTreeMap<(AccountId, String), Label>>,
    sync_states: RwLock<HashMap<AccountId, SyncState>>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
            emails: RwLock::new(HashMap::new()),
            threads: RwLock::new(HashMap::new()),
            labels: RwLock::new(BTreeMap::new()),
            sync_states: RwLock::new(HashMap::new()),
        }
    }

    fn account_emails(&self, account_id: AccountId) -> Vec<Email> {
        let emails = self.emails.read().unwrap();
        emails
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest thread first, ties broken by id
fn sort_threads(threads: &mut [EmailThread]) {
    threads.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl MailStore for InMemoryMailStore {
    fn upsert_account(&self, mut account: Account) -> Result<AccountId> {
        let mut accounts = self.accounts.write().unwrap();
        if account.id == 0 {
            account.id = accounts.keys().next_back().copied().unwrap_or(0) + 1;
        }
        let id = account.id;
        accounts.insert(id, account);
        Ok(id)
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(&id).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.read().unwrap().values().cloned().collect())
    }

    fn set_account_last_sync(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        if let Some(account) = self.accounts.write().unwrap().get_mut(&id) {
            account.last_sync_at = Some(at);
        }
        Ok(())
    }

    fn upsert_email(&self, email: Email) -> Result<()> {
        let mut emails = self.emails.write().unwrap();
        emails.insert((email.account_id, email.id.clone()), email);
        Ok(())
    }

    fn get_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>> {
        let emails = self.emails.read().unwrap();
        Ok(emails.get(&(account_id, id.clone())).cloned())
    }

    fn delete_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>> {
        let mut emails = self.emails.write().unwrap();
        Ok(emails.remove(&(account_id, id.clone())))
    }

    fn list_emails_for_thread(
        &self,
        account_id: AccountId,
        thread_id: &ThreadId,
    ) -> Result<Vec<Email>> {
        let mut result: Vec<Email> = self
            .account_emails(account_id)
            .into_iter()
            .filter(|e| &e.thread_id == thread_id)
            .collect();

        // Sort by received_at ascending
        result.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(result)
    }

    fn list_emails_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Email>> {
        let mut result: Vec<Email> = self
            .account_emails(account_id)
            .into_iter()
            .filter(|e| e.has_label(label))
            .collect();
        result.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    fn list_oldest_emails(&self, account_id: AccountId, limit: usize) -> Result<Vec<Email>> {
        let mut result = self.account_emails(account_id);
        result.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        result.truncate(limit);
        Ok(result)
    }

    fn count_emails(&self, account_id: AccountId) -> Result<usize> {
        let emails = self.emails.read().unwrap();
        Ok(emails.keys().filter(|(a, _)| *a == account_id).count())
    }

    fn upsert_thread(&self, thread: EmailThread) -> Result<()> {
        let mut threads = self.threads.write().unwrap();
        threads.insert((thread.account_id, thread.id.clone()), thread);
        Ok(())
    }

    fn get_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<Option<EmailThread>> {
        let threads = self.threads.read().unwrap();
        Ok(threads.get(&(account_id, id.clone())).cloned())
    }

    fn delete_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<()> {
        self.threads.write().unwrap().remove(&(account_id, id.clone()));
        Ok(())
    }

    fn list_threads(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EmailThread>> {
        let threads = self.threads.read().unwrap();
        let mut thread_list: Vec<EmailThread> = threads
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        sort_threads(&mut thread_list);

        Ok(thread_list.into_iter().skip(offset).take(limit).collect())
    }

    fn list_threads_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EmailThread>> {
        let labelled: HashSet<ThreadId> = self
            .account_emails(account_id)
            .into_iter()
            .filter(|e| e.has_label(label))
            .map(|e| e.thread_id)
            .collect();

        let threads = self.threads.read().unwrap();
        let mut thread_list: Vec<EmailThread> = labelled
            .into_iter()
            .filter_map(|id| threads.get(&(account_id, id)).cloned())
            .collect();
        sort_threads(&mut thread_list);

        Ok(thread_list.into_iter().skip(offset).take(limit).collect())
    }

    fn count_threads(&self, account_id: AccountId) -> Result<usize> {
        let threads = self.threads.read().unwrap();
        Ok(threads.keys().filter(|(a, _)| *a == account_id).count())
    }

    fn upsert_label(&self, label: Label) -> Result<()> {
        let mut labels = self.labels.write().unwrap();
        labels.insert((label.account_id, label.id.as_str().to_string()), label);
        Ok(())
    }

    fn list_labels(&self, account_id: AccountId) -> Result<Vec<Label>> {
        let labels = self.labels.read().unwrap();
        Ok(labels
            .iter()
            .filter(|((a, _), _)| *a == account_id)
            .map(|(_, label)| label.clone())
            .collect())
    }

    fn get_sync_state(&self, account_id: AccountId) -> Result<Option<SyncState>> {
        Ok(self.sync_states.read().unwrap().get(&account_id).cloned())
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        self.sync_states
            .write()
            .unwrap()
            .insert(state.account_id, state);
        Ok(())
    }

    fn delete_sync_state(&self, account_id: AccountId) -> Result<()> {
        self.sync_states.write().unwrap().remove(&account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn make_email(account_id: AccountId, id: &str, thread: &str, secs: i64, labels: &[&str]) -> Email {
        Email::builder(EmailId::new(id), account_id, ThreadId::new(thread))
            .subject("Test")
            .received_at(Utc.timestamp_opt(secs, 0).unwrap())
            .labels(labels.iter().copied())
            .build()
    }

    fn make_thread(account_id: AccountId, id: &str, secs: i64) -> EmailThread {
        EmailThread {
            id: ThreadId::new(id),
            account_id,
            subject: "Test".to_string(),
            snippet: String::new(),
            last_message_at: Utc.timestamp_opt(secs, 0).unwrap(),
            message_count: 1,
            is_read: true,
            is_starred: false,
            participants: BTreeSet::new(),
        }
    }

    #[test]
    fn test_account_ids_are_assigned() {
        let store = InMemoryMailStore::new();
        let a = store.upsert_account(Account::new("a@example.com")).unwrap();
        let b = store
            .upsert_account(Account::new("b@example.com").with_enabled(false))
            .unwrap();

        assert_eq!((a, b), (1, 2));
        assert_eq!(store.list_accounts().unwrap().len(), 2);
        let enabled = store.list_enabled_accounts().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].email, "a@example.com");
    }

    #[test]
    fn test_emails_are_scoped_by_account() {
        let store = InMemoryMailStore::new();
        store.upsert_email(make_email(1, "m1", "t1", 100, &[])).unwrap();
        store.upsert_email(make_email(2, "m1", "t1", 100, &[])).unwrap();

        assert_eq!(store.count_emails(1).unwrap(), 1);
        assert!(store.delete_email(1, &EmailId::new("m1")).unwrap().is_some());
        assert!(store.has_email(2, &EmailId::new("m1")).unwrap());
        assert!(!store.has_email(1, &EmailId::new("m1")).unwrap());
    }

    #[test]
    fn test_oldest_and_label_ordering() {
        let store = InMemoryMailStore::new();
        store.upsert_email(make_email(1, "new", "t1", 300, &["INBOX"])).unwrap();
        store.upsert_email(make_email(1, "old", "t2", 100, &["INBOX"])).unwrap();
        store.upsert_email(make_email(1, "mid", "t3", 200, &["SENT"])).unwrap();

        let oldest: Vec<String> = store
            .list_oldest_emails(1, 2)
            .unwrap()
            .into_iter()
            .map(|e| e.id.0)
            .collect();
        assert_eq!(oldest, vec!["old", "mid"]);

        let inbox: Vec<String> = store
            .list_emails_by_label(1, "INBOX", 10, 0)
            .unwrap()
            .into_iter()
            .map(|e| e.id.0)
            .collect();
        assert_eq!(inbox, vec!["new", "old"]);
    }

    #[test]
    fn test_list_threads_by_label() {
        let store = InMemoryMailStore::new();
        store.upsert_email(make_email(1, "m1", "t1", 100, &["INBOX"])).unwrap();
        store.upsert_email(make_email(1, "m2", "t2", 200, &["SENT"])).unwrap();
        store.upsert_email(make_email(1, "m3", "t3", 300, &["INBOX"])).unwrap();
        for (id, secs) in [("t1", 100), ("t2", 200), ("t3", 300)] {
            store.upsert_thread(make_thread(1, id, secs)).unwrap();
        }

        let inbox = store.list_threads_by_label(1, "INBOX", 10, 0).unwrap();
        let ids: Vec<&str> = inbox.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1"]);
        assert_eq!(store.list_threads(1, 10, 1).unwrap().len(), 2);
        assert_eq!(store.count_threads(1).unwrap(), 3);
    }

    #[test]
    fn test_sync_state_roundtrip() {
        let store = InMemoryMailStore::new();
        assert!(store.get_sync_state(7).unwrap().is_none());

        let mut state = SyncState::new(7);
        state.full_sync_completed("12345", 3);
        store.save_sync_state(state).unwrap();

        let loaded = store.get_sync_state(7).unwrap().unwrap();
        assert_eq!(loaded.cursor.as_deref(), Some("12345"));

        store.delete_sync_state(7).unwrap();
        assert!(store.get_sync_state(7).unwrap().is_none());
    }
}
