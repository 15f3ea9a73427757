//! Sync state tracking for incremental Gmail sync

use super::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the most recent sync attempt for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "syncing" => SyncStatus::Syncing,
            "completed" => SyncStatus::Completed,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Idle,
        }
    }
}

/// Durable sync checkpoint for an account
///
/// Exactly one per account. The presence of `cursor` decides whether the
/// next run is incremental; it is only written once a full sync has
/// finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub account_id: AccountId,
    /// Gmail historyId of the last applied server state
    pub cursor: Option<String>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    /// Local email count after the last completed run
    pub email_count: usize,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    /// Schema version for migrations
    pub sync_version: u32,
}

impl SyncState {
    /// Create a fresh state for an account that has never synced
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            cursor: None,
            last_full_sync_at: None,
            last_incremental_sync_at: None,
            email_count: 0,
            status: SyncStatus::Idle,
            error_message: None,
            sync_version: 1,
        }
    }

    pub fn mark_syncing(&mut self) {
        self.status = SyncStatus::Syncing;
        self.error_message = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error;
        self.error_message = Some(message.into());
    }

    /// Record a finished full sync with the cursor fetched afterwards
    pub fn full_sync_completed(&mut self, cursor: impl Into<String>, email_count: usize) {
        self.cursor = Some(cursor.into());
        self.last_full_sync_at = Some(Utc::now());
        self.email_count = email_count;
        self.status = SyncStatus::Completed;
        self.error_message = None;
    }

    /// Record a finished incremental sync with the cursor the delta call reported
    pub fn incremental_sync_completed(&mut self, cursor: impl Into<String>, email_count: usize) {
        self.cursor = Some(cursor.into());
        self.last_incremental_sync_at = Some(Utc::now());
        self.email_count = email_count;
        self.status = SyncStatus::Completed;
        self.error_message = None;
    }

    /// Most recent completion of either kind
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_full_sync_at.max(self.last_incremental_sync_at)
    }
}
