//! Label model mirroring a Gmail label definition

use super::AccountId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a label (Gmail label ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Well-known Gmail system labels
    pub const INBOX: &'static str = "INBOX";
    pub const SENT: &'static str = "SENT";
    pub const DRAFTS: &'static str = "DRAFT";
    pub const TRASH: &'static str = "TRASH";
    pub const SPAM: &'static str = "SPAM";
    pub const STARRED: &'static str = "STARRED";
    pub const IMPORTANT: &'static str = "IMPORTANT";
    pub const UNREAD: &'static str = "UNREAD";
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local mirror of a remote label definition
///
/// Upserted by remote id on every sync; labels that vanish remotely are left
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Label ID (e.g., "INBOX", "Label_123")
    pub id: LabelId,
    /// Owning account
    pub account_id: AccountId,
    /// Display name
    pub name: String,
    /// Whether this is a system label
    pub is_system: bool,
    /// Messages carrying the label, as reported by the server
    pub message_count: u32,
    /// Unread messages carrying the label, as reported by the server
    pub unread_count: u32,
}

impl Label {
    /// Create a user label
    pub fn new(account_id: AccountId, id: impl Into<LabelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_id,
            name: name.into(),
            is_system: false,
            message_count: 0,
            unread_count: 0,
        }
    }

    /// Create a system label
    pub fn system(account_id: AccountId, id: impl Into<LabelId>, name: impl Into<String>) -> Self {
        Self {
            is_system: true,
            ..Self::new(account_id, id, name)
        }
    }

    pub fn with_message_count(mut self, count: u32) -> Self {
        self.message_count = count;
        self
    }

    pub fn with_unread_count(mut self, count: u32) -> Self {
        self.unread_count = count;
        self
    }
}
