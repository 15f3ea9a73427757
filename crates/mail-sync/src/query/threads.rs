//! Thread query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AccountId, Email, EmailThread, ThreadId};
use crate::storage::MailStore;

/// Summary information for displaying a thread in a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread ID
    pub id: ThreadId,
    /// Account ID this thread belongs to
    pub account_id: AccountId,
    /// Subject line
    pub subject: String,
    /// Preview snippet
    pub snippet: String,
    /// Timestamp of the most recent message
    pub last_message_at: DateTime<Utc>,
    /// Number of messages in the thread
    pub message_count: usize,
    /// Whether the thread has unread messages
    pub is_unread: bool,
    pub is_starred: bool,
    /// Everyone on the thread, sorted
    pub participants: Vec<String>,
}

impl From<EmailThread> for ThreadSummary {
    fn from(thread: EmailThread) -> Self {
        Self {
            id: thread.id,
            account_id: thread.account_id,
            subject: thread.subject,
            snippet: thread.snippet,
            last_message_at: thread.last_message_at,
            message_count: thread.message_count,
            is_unread: !thread.is_read,
            is_starred: thread.is_starred,
            participants: thread.participants.into_iter().collect(),
        }
    }
}

/// Detailed thread information including all messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDetail {
    /// The thread metadata
    pub thread: EmailThread,
    /// All messages in the thread, ordered chronologically
    pub messages: Vec<Email>,
}

/// List threads with pagination
///
/// Returns threads sorted by last_message_at descending (newest first).
///
/// # Arguments
/// * `store` - The storage backend
/// * `account_id` - Account to read
/// * `limit` - Maximum number of threads to return
/// * `offset` - Number of threads to skip
pub fn list_threads(
    store: &dyn MailStore,
    account_id: AccountId,
    limit: usize,
    offset: usize,
) -> Result<Vec<ThreadSummary>> {
    let threads = store.list_threads(account_id, limit, offset)?;
    Ok(threads.into_iter().map(ThreadSummary::from).collect())
}

/// List threads by label with pagination
///
/// Returns threads that have at least one message with the given label,
/// sorted by last_message_at descending (newest first).
///
/// # Arguments
/// * `store` - The storage backend
/// * `account_id` - Account to read
/// * `label` - The label ID to filter by (e.g., "INBOX", "SENT")
/// * `limit` - Maximum number of threads to return
/// * `offset` - Number of threads to skip
pub fn list_threads_by_label(
    store: &dyn MailStore,
    account_id: AccountId,
    label: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<ThreadSummary>> {
    let threads = store.list_threads_by_label(account_id, label, limit, offset)?;
    Ok(threads.into_iter().map(ThreadSummary::from).collect())
}

/// Get a thread with all of its messages, oldest first
pub fn get_thread_detail(
    store: &dyn MailStore,
    account_id: AccountId,
    thread_id: &ThreadId,
) -> Result<Option<ThreadDetail>> {
    let thread = match store.get_thread(account_id, thread_id)? {
        Some(t) => t,
        None => return Ok(None),
    };

    let messages = store.list_emails_for_thread(account_id, thread_id)?;

    Ok(Some(ThreadDetail { thread, messages }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailAddress, EmailId};
    use crate::storage::InMemoryMailStore;
    use crate::sync::rederive_threads;

    fn setup_test_store() -> InMemoryMailStore {
        let store = InMemoryMailStore::new();
        let mut thread_ids = Vec::new();

        for i in 0..5 {
            let thread_id = ThreadId::new(format!("t{}", i));
            for j in 0..2 {
                let mut labels = vec!["INBOX"];
                if i % 2 == 0 && j == 1 {
                    labels.push("UNREAD");
                }
                if i == 3 {
                    labels = vec!["SENT"];
                }
                let email = Email::builder(
                    EmailId::new(format!("m{}_{}", i, j)),
                    1,
                    thread_id.clone(),
                )
                .from(EmailAddress::new(format!("user{}@example.com", i)))
                .subject(format!("Thread {}", i))
                .snippet(format!("Message {} body", j))
                .received_at(Utc::now() - chrono::Duration::hours(i as i64 * 2 + (1 - j) as i64))
                .labels(labels)
                .build();
                store.upsert_email(email).unwrap();
            }
            thread_ids.push(thread_id);
        }

        rederive_threads(&store, 1, &thread_ids).unwrap();
        store
    }

    #[test]
    fn test_list_threads() {
        let store = setup_test_store();

        let threads = list_threads(&store, 1, 3, 0).unwrap();
        assert_eq!(threads.len(), 3);
        // Should be sorted by last_message_at descending
        assert_eq!(threads[0].id.0, "t0");
        assert_eq!(threads[1].id.0, "t1");
        assert_eq!(threads[2].id.0, "t2");
        assert!(threads[0].is_unread);
        assert!(!threads[1].is_unread);
    }

    #[test]
    fn test_list_threads_pagination() {
        let store = setup_test_store();

        let page1 = list_threads(&store, 1, 2, 0).unwrap();
        let page2 = list_threads(&store, 1, 2, 2).unwrap();

        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_ne!(page1[0].id, page2[0].id);
    }

    #[test]
    fn test_list_threads_scoped_to_account() {
        let store = setup_test_store();
        assert!(list_threads(&store, 2, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_list_threads_by_label() {
        let store = setup_test_store();

        let sent = list_threads_by_label(&store, 1, "SENT", 10, 0).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id.0, "t3");

        let inbox = list_threads_by_label(&store, 1, "INBOX", 10, 0).unwrap();
        assert_eq!(inbox.len(), 4);
    }

    #[test]
    fn test_get_thread_detail() {
        let store = setup_test_store();

        let detail = get_thread_detail(&store, 1, &ThreadId::new("t0")).unwrap();
        assert!(detail.is_some());

        let detail = detail.unwrap();
        assert_eq!(detail.thread.id.0, "t0");
        assert_eq!(detail.messages.len(), 2);
        assert!(detail.messages[0].received_at <= detail.messages[1].received_at);
    }

    #[test]
    fn test_get_thread_detail_not_found() {
        let store = setup_test_store();

        let detail = get_thread_detail(&store, 1, &ThreadId::new("nonexistent")).unwrap();
        assert!(detail.is_none());
    }
}
