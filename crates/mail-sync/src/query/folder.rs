//! Folder views: individual emails carrying a label

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AccountId, Email, EmailId, ThreadId};
use crate::storage::MailStore;

/// One row of a folder listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: EmailId,
    pub thread_id: ThreadId,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
}

impl From<Email> for EmailSummary {
    fn from(email: Email) -> Self {
        Self {
            sender: email.from.display(),
            is_read: email.is_read(),
            is_starred: email.is_starred(),
            id: email.id,
            thread_id: email.thread_id,
            subject: email.subject,
            snippet: email.snippet,
            received_at: email.received_at,
        }
    }
}

/// List the emails of one folder (label), newest first
///
/// # Arguments
/// * `store` - The storage backend
/// * `account_id` - Account to read
/// * `label` - Label ID backing the folder (e.g., "INBOX", "DRAFT")
/// * `limit` - Maximum number of emails to return
/// * `offset` - Number of emails to skip
pub fn list_folder(
    store: &dyn MailStore,
    account_id: AccountId,
    label: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<EmailSummary>> {
    let emails = store.list_emails_by_label(account_id, label, limit, offset)?;
    Ok(emails.into_iter().map(EmailSummary::from).collect())
}
