//! Thread model representing a Gmail conversation

use super::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate view over every local Email sharing a thread id
///
/// Always produced by `sync::derive_thread` from the full member set; never
/// patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailThread {
    /// Gmail thread ID
    pub id: ThreadId,
    /// Owning account
    pub account_id: AccountId,
    /// Subject of the earliest message
    pub subject: String,
    /// Snippet of the latest message
    pub snippet: String,
    /// Timestamp of the most recent message
    pub last_message_at: DateTime<Utc>,
    /// Number of local messages in the thread
    pub message_count: usize,
    /// True only if every member is read
    pub is_read: bool,
    /// True if any member is starred
    pub is_starred: bool,
    /// Normalized addresses of everyone on the thread
    pub participants: BTreeSet<String>,
}
