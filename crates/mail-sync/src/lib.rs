//! Mail sync crate - keeps a local mailbox mirror in step with Gmail
//!
//! This crate provides:
//! - Domain models (Account, Email, EmailThread, Label, SyncState)
//! - The `MailService` contract plus an in-memory implementation
//! - Storage trait abstractions with in-memory and SQLite stores
//! - Full and incremental sync, per-account locking, fan-out and scheduling
//! - Query API for reading the mirror back out

pub mod config;
pub mod gmail;
pub mod models;
pub mod query;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use gmail::{
    BatchFailure, BatchResult, GmailError, GmailResult, HistoryType, InMemoryMailService,
    ListMessagesRequest, MailService, normalize_message,
};
pub use models::{
    Account, AccountId, Email, EmailAddress, EmailId, EmailThread, Label, LabelId, SyncState,
    SyncStatus, ThreadId,
};
pub use query::{
    EmailSummary, ThreadDetail, ThreadSummary, get_thread_detail, list_folder, list_threads,
    list_threads_by_label,
};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use sync::{
    CursorExpiredError, ServiceFactory, SyncCoordinator, SyncEngine, SyncLock, SyncLockGuard,
    SyncMode, SyncOptions, SyncOutcome, SyncProgress, SyncResult, SyncScheduler,
    determine_sync_mode,
};
