//! Account model representing a signed-in Gmail account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric account identifier (database primary key)
pub type AccountId = i64;

/// A registered Gmail account
///
/// Accounts are created on sign-in and removed on sign-out outside of the
/// sync subsystem. Sync only reads them and stamps `last_sync_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (0 until assigned by the store)
    pub id: AccountId,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub display_name: Option<String>,
    /// Disabled accounts are skipped by `sync_all_accounts`
    pub enabled: bool,
    /// When the account was added
    pub added_at: DateTime<Utc>,
    /// When the last successful sync finished
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account (id will be assigned by the store)
    pub fn new(email: impl Into<String>) -> Self {
        Self::with_id(0, email)
    }

    /// Create an account with a known ID (loaded from the store)
    pub fn with_id(id: AccountId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: None,
            enabled: true,
            added_at: Utc::now(),
            last_sync_at: None,
        }
    }

    /// Set display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Enable or disable background sync for this account
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
