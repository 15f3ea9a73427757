//! Typed outcomes of sync attempts

use serde::{Deserialize, Serialize};

use crate::models::SyncStatus;

/// Which algorithm an engine run used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Counts reported by one successful engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub mode: SyncMode,
    /// Emails inserted
    pub new: usize,
    /// Existing emails rewritten or relabelled
    pub updated: usize,
    /// Emails removed by delete records (evictions are not counted)
    pub deleted: usize,
    /// Items dropped from this run: failed fetches and unparseable messages
    pub skipped: usize,
    /// The run stopped early on request
    pub cancelled: bool,
}

impl SyncResult {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            new: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            cancelled: false,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.new == 0 && self.updated == 0 && self.deleted == 0
    }

    /// "<n> new, <m> updated, <k> deleted", or "Up to date" when all are zero
    pub fn progress_message(&self) -> String {
        if self.is_up_to_date() {
            "Up to date".to_string()
        } else {
            format!(
                "{} new, {} updated, {} deleted",
                self.new, self.updated, self.deleted
            )
        }
    }
}

/// Latest known state of one account's sync, for observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub status: SyncStatus,
    pub message: String,
}

impl SyncProgress {
    pub fn syncing() -> Self {
        Self {
            status: SyncStatus::Syncing,
            message: "Syncing".to_string(),
        }
    }

    pub fn completed(result: &SyncResult) -> Self {
        Self {
            status: SyncStatus::Completed,
            message: result.progress_message(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            message: message.into(),
        }
    }
}

/// What `SyncCoordinator::sync_account` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another attempt for this account was already running
    Skipped,
    Completed(SyncResult),
    Failed(String),
}

impl SyncOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped)
    }

    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            SyncOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}
