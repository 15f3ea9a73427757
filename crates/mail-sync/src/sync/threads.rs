//! Thread derivation
//!
//! Threads are never patched. Whenever a member changes, the thread is
//! rebuilt from the full current set of member emails in the store.

use anyhow::Result;
use log::debug;
use std::collections::BTreeSet;

use crate::models::{AccountId, Email, EmailThread, ThreadId};
use crate::storage::MailStore;

/// Compute thread properties from all of its member emails
///
/// Returns `None` for an empty member set.
///
/// # Arguments
/// * `account_id` - Owning account
/// * `thread_id` - Thread being derived
/// * `members` - Every email currently in the thread, in any order
pub fn derive_thread(
    account_id: AccountId,
    thread_id: &ThreadId,
    members: &[Email],
) -> Option<EmailThread> {
    // Subject comes from the first message, snippet from the latest
    let first = members
        .iter()
        .min_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)))?;
    let latest = members
        .iter()
        .max_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)))?;

    let subject = if first.subject.is_empty() {
        "(no subject)".to_string()
    } else {
        first.subject.clone()
    };

    let participants: BTreeSet<String> = members.iter().flat_map(Email::participants).collect();

    Some(EmailThread {
        id: thread_id.clone(),
        account_id,
        subject,
        snippet: latest.snippet.clone(),
        last_message_at: latest.received_at,
        message_count: members.len(),
        is_read: members.iter().all(Email::is_read),
        is_starred: members.iter().any(Email::is_starred),
        participants,
    })
}

/// Rebuild each thread from the store, deleting threads with no members left
///
/// Returns the number of threads written.
pub fn rederive_threads<'a>(
    store: &dyn MailStore,
    account_id: AccountId,
    thread_ids: impl IntoIterator<Item = &'a ThreadId>,
) -> Result<usize> {
    let mut written = 0;
    for thread_id in thread_ids {
        let members = store.list_emails_for_thread(account_id, thread_id)?;
        match derive_thread(account_id, thread_id, &members) {
            Some(thread) => {
                store.upsert_thread(thread)?;
                written += 1;
            }
            None => {
                debug!("Thread {} has no emails left, removing", thread_id);
                store.delete_thread(account_id, thread_id)?;
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailAddress, EmailId};
    use crate::storage::InMemoryMailStore;
    use chrono::Utc;

    fn make_test_email(id: &str, subject: &str, age_hours: i64, labels: &[&str]) -> Email {
        let received_at = Utc::now() - chrono::Duration::hours(age_hours);
        Email::builder(EmailId::new(id), 1, ThreadId::new("t1"))
            .from(EmailAddress::new(format!("{}@example.com", id)))
            .to(vec![EmailAddress::new("Me@Example.com")])
            .subject(subject)
            .snippet(format!("Body for {}", id))
            .received_at(received_at)
            .labels(labels.iter().copied())
            .build()
    }

    #[test]
    fn test_derive_thread() {
        let members = vec![
            make_test_email("m2", "Re: Original Subject", 2, &["INBOX"]),
            make_test_email("m1", "Original Subject", 3, &["INBOX", "STARRED"]),
            make_test_email("m3", "Re: Original Subject", 1, &["INBOX", "UNREAD"]),
        ];

        let thread = derive_thread(1, &ThreadId::new("t1"), &members).unwrap();

        assert_eq!(thread.subject, "Original Subject");
        assert_eq!(thread.snippet, "Body for m3"); // Latest message
        assert_eq!(thread.message_count, 3);
        assert_eq!(thread.last_message_at, members[2].received_at);
        assert!(!thread.is_read);
        assert!(thread.is_starred);
        assert!(thread.participants.contains("m1@example.com"));
        assert!(thread.participants.contains("me@example.com"));
        assert_eq!(thread.participants.len(), 4);
    }

    #[test]
    fn test_derive_thread_no_subject() {
        let members = vec![make_test_email("m1", "", 1, &[])];
        let thread = derive_thread(1, &ThreadId::new("t1"), &members).unwrap();
        assert_eq!(thread.subject, "(no subject)");
        assert!(thread.is_read);
        assert!(!thread.is_starred);
    }

    #[test]
    fn test_derive_thread_empty() {
        assert!(derive_thread(1, &ThreadId::new("t1"), &[]).is_none());
    }

    #[test]
    fn test_rederive_counts_live_members() {
        let store = InMemoryMailStore::new();
        store.upsert_email(make_test_email("m1", "Hello", 3, &[])).unwrap();
        store.upsert_email(make_test_email("m2", "Re: Hello", 2, &[])).unwrap();

        let thread_id = ThreadId::new("t1");
        assert_eq!(rederive_threads(&store, 1, [&thread_id]).unwrap(), 1);
        assert_eq!(store.get_thread(1, &thread_id).unwrap().unwrap().message_count, 2);

        store.delete_email(1, &EmailId::new("m2")).unwrap();
        rederive_threads(&store, 1, [&thread_id]).unwrap();
        assert_eq!(store.get_thread(1, &thread_id).unwrap().unwrap().message_count, 1);

        store.delete_email(1, &EmailId::new("m1")).unwrap();
        assert_eq!(rederive_threads(&store, 1, [&thread_id]).unwrap(), 0);
        assert!(store.get_thread(1, &thread_id).unwrap().is_none());
    }
}
