//! Sync subsystem
//!
//! Keeps the local mirror of each account consistent with the server:
//! - `SyncEngine` runs one full or incremental attempt for one account
//! - `SyncCoordinator` fans attempts out across accounts, one at a time per account
//! - `SyncScheduler` drives the coordinator on a timer

mod coordinator;
mod delta;
mod engine;
mod lock;
mod result;
mod scheduler;
mod threads;

pub use coordinator::{ServiceFactory, SyncCoordinator};
pub use delta::{MessageDelta, fold_history};
pub use engine::{SyncEngine, SyncOptions};
pub use lock::{SyncLock, SyncLockGuard};
pub use result::{SyncMode, SyncOutcome, SyncProgress, SyncResult};
pub use scheduler::SyncScheduler;
pub use threads::{derive_thread, rederive_threads};

use crate::models::SyncState;

/// The stored cursor is too old to replay history from
///
/// Raised by the incremental path and handled inside the engine by falling
/// back to a full sync; callers of `SyncEngine::sync` never see it.
#[derive(Debug, thiserror::Error)]
#[error("History cursor {cursor} expired or invalid")]
pub struct CursorExpiredError {
    pub cursor: String,
}

/// Pick the algorithm for the next run from the stored checkpoint
///
/// Full iff no cursor has ever been stored.
pub fn determine_sync_mode(state: Option<&SyncState>) -> SyncMode {
    match state.and_then(|s| s.cursor.as_ref()) {
        Some(_) => SyncMode::Incremental,
        None => SyncMode::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_sync_mode() {
        assert_eq!(determine_sync_mode(None), SyncMode::Full);

        let mut state = SyncState::new(1);
        assert_eq!(determine_sync_mode(Some(&state)), SyncMode::Full);

        // An errored run keeps its cursor and stays incremental
        state.full_sync_completed("100", 0);
        state.mark_error("network");
        assert_eq!(determine_sync_mode(Some(&state)), SyncMode::Incremental);
    }

    #[test]
    fn test_cursor_expired_is_detectable() {
        let err: anyhow::Error = CursorExpiredError {
            cursor: "42".to_string(),
        }
        .into();
        assert!(err.is::<CursorExpiredError>());
        assert_eq!(err.to_string(), "History cursor 42 expired or invalid");
    }
}
