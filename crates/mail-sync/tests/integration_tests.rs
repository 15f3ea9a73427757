//! Integration tests for the mail-sync crate
//!
//! These tests drive complete sync runs against an in-memory mailbox and
//! check what ends up in the local store.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mail_sync::gmail::api::{
    GmailLabel, GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse,
};
use mail_sync::gmail::{GmailResult, HistoryType, InMemoryMailService, ListMessagesRequest, MailService};
use mail_sync::models::{Account, AccountId, EmailId, LabelId, SyncStatus, ThreadId};
use mail_sync::query::{get_thread_detail, list_folder, list_threads};
use mail_sync::storage::{InMemoryMailStore, MailStore, SqliteMailStore};
use mail_sync::sync::{SyncCoordinator, SyncEngine, SyncMode, SyncOptions, SyncOutcome};
use mail_sync::SyncConfig;
use tokio::sync::Notify;

const ACCOUNT: AccountId = 1;
const BASE_DATE: i64 = 1_700_000_000_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Helper to build a remote message; later `n` means newer
fn remote(n: usize, labels: &[&str]) -> GmailMessage {
    InMemoryMailService::make_message(
        &format!("m{:04}", n),
        &format!("t{:04}", n / 3),
        "Sender <sender@example.com>",
        &format!("Subject {}", n / 3),
        BASE_DATE + n as i64 * 60_000,
        labels,
    )
}

fn mailbox(count: usize) -> Arc<InMemoryMailService> {
    let service = InMemoryMailService::new("me@example.com");
    for n in 0..count {
        let labels: &[&str] = if n % 4 == 0 {
            &["INBOX", "UNREAD", "STARRED"]
        } else {
            &["INBOX"]
        };
        service.seed_message(remote(n, labels));
    }
    Arc::new(service)
}

fn engine(service: &Arc<InMemoryMailService>, store: Arc<dyn MailStore>) -> SyncEngine {
    SyncEngine::new(ACCOUNT, service.clone(), store, SyncOptions::default())
}

/// Every stored email's flags agree with its labels, and every thread's
/// count matches its live members
fn assert_store_consistent(store: &dyn MailStore) {
    let emails = store.list_oldest_emails(ACCOUNT, usize::MAX).unwrap();
    for email in &emails {
        assert_eq!(email.is_read(), !email.has_label(LabelId::UNREAD), "{}", email.id);
        assert_eq!(email.is_starred(), email.has_label(LabelId::STARRED), "{}", email.id);
    }

    let threads = store.list_threads(ACCOUNT, usize::MAX, 0).unwrap();
    let mut counted = 0;
    for thread in &threads {
        let members = store.list_emails_for_thread(ACCOUNT, &thread.id).unwrap();
        assert_eq!(thread.message_count, members.len(), "{}", thread.id);
        assert_eq!(thread.is_read, members.iter().all(|e| e.is_read()));
        counted += members.len();
    }
    assert_eq!(counted, emails.len());
}

#[tokio::test]
async fn test_full_sync_of_150_messages() {
    init_logging();
    let service = mailbox(150);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());

    let result = engine.sync().await.unwrap();

    assert_eq!(result.mode, SyncMode::Full);
    assert_eq!(result.new, 150);
    // Quick page of 100, then the remaining 50
    assert_eq!(service.list_calls(), 2);
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 150);
    assert_eq!(store.count_threads(ACCOUNT).unwrap(), 50);

    let state = store.get_sync_state(ACCOUNT).unwrap().unwrap();
    assert_eq!(state.cursor, Some(service.current_history_id()));
    assert_eq!(state.status, SyncStatus::Completed);
    assert_eq!(state.email_count, 150);
    assert!(state.last_full_sync_at.is_some());

    assert_store_consistent(store.as_ref());
}

#[tokio::test]
async fn test_delete_record_removes_local_email() {
    init_logging();
    let service = mailbox(9);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());
    engine.sync().await.unwrap();

    let before = store.get_sync_state(ACCOUNT).unwrap().unwrap().cursor;
    service.delete_message("m0004");

    let result = engine.sync().await.unwrap();

    assert_eq!(result.mode, SyncMode::Incremental);
    assert_eq!(result.deleted, 1);
    assert_eq!(result.progress_message(), "0 new, 0 updated, 1 deleted");
    assert!(!store.has_email(ACCOUNT, &EmailId::new("m0004")).unwrap());

    let after = store.get_sync_state(ACCOUNT).unwrap().unwrap().cursor;
    assert_ne!(after, before);
    assert_eq!(after, Some(service.current_history_id()));

    let thread = store.get_thread(ACCOUNT, &ThreadId::new("t0001")).unwrap().unwrap();
    assert_eq!(thread.message_count, 2);
    assert_store_consistent(store.as_ref());
}

#[tokio::test]
async fn test_stale_cursor_falls_back_to_full_sync() {
    init_logging();
    let service = mailbox(5);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());
    engine.sync().await.unwrap();

    let stale = store.get_sync_state(ACCOUNT).unwrap().unwrap().cursor.unwrap();
    service.expire_history();
    service.seed_message(remote(5, &["INBOX"]));

    let result = engine.sync().await.unwrap();

    assert_eq!(result.mode, SyncMode::Full);
    assert_eq!(result.new, 1);
    assert_eq!(result.updated, 5);

    let state = store.get_sync_state(ACCOUNT).unwrap().unwrap();
    assert_ne!(state.cursor.as_deref(), Some(stale.as_str()));
    assert_eq!(state.cursor, Some(service.current_history_id()));
    assert_eq!(state.status, SyncStatus::Completed);
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 6);
}

#[tokio::test]
async fn test_added_and_labelled_message_fetched_once() {
    init_logging();
    let service = mailbox(3);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());
    engine.sync().await.unwrap();

    service.add_message(remote(10, &["INBOX", "UNREAD"]));
    service.add_labels("m0010", &["STARRED"]);

    let result = engine.sync().await.unwrap();

    assert_eq!(result.new, 1);
    assert_eq!(service.get_message_calls("m0010"), 1);

    let email = store.get_email(ACCOUNT, &EmailId::new("m0010")).unwrap().unwrap();
    assert!(email.is_starred());
    assert!(!email.is_read());
    assert_store_consistent(store.as_ref());
}

#[tokio::test]
async fn test_incremental_sync_is_idempotent() {
    init_logging();
    let service = mailbox(6);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());
    engine.sync().await.unwrap();

    for _ in 0..2 {
        let result = engine.sync().await.unwrap();
        assert_eq!(result.mode, SyncMode::Incremental);
        assert!(result.is_up_to_date());
        assert_eq!(result.progress_message(), "Up to date");
    }
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 6);
}

#[tokio::test]
async fn test_label_changes_keep_flags_consistent() {
    init_logging();
    let service = mailbox(8);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());
    engine.sync().await.unwrap();
    let fetched = service.total_get_message_calls();

    // Read m0000 (was unread and starred), star m0001, unstar m0004
    service.remove_labels("m0000", &["UNREAD"]);
    service.add_labels("m0001", &["STARRED", "UNREAD"]);
    service.remove_labels("m0004", &["STARRED"]);

    let result = engine.sync().await.unwrap();
    assert_eq!(result.updated, 3);
    assert_eq!(service.total_get_message_calls(), fetched);

    let m0 = store.get_email(ACCOUNT, &EmailId::new("m0000")).unwrap().unwrap();
    assert!(m0.is_read());
    assert!(m0.is_starred());
    let m1 = store.get_email(ACCOUNT, &EmailId::new("m0001")).unwrap().unwrap();
    assert!(!m1.is_read());
    assert!(m1.is_starred());
    let m4 = store.get_email(ACCOUNT, &EmailId::new("m0004")).unwrap().unwrap();
    assert!(!m4.is_starred());

    // t0000 holds m0000..m0002; m0001 is unread again
    let thread = store.get_thread(ACCOUNT, &ThreadId::new("t0000")).unwrap().unwrap();
    assert!(!thread.is_read);
    assert!(thread.is_starred);
    assert_store_consistent(store.as_ref());
}

#[tokio::test]
async fn test_retention_cap_holds_across_syncs() {
    init_logging();
    let service = mailbox(1_050);
    let store = Arc::new(InMemoryMailStore::new());
    let engine = engine(&service, store.clone());

    engine.sync().await.unwrap();
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 1_000);
    // The 50 oldest never made it
    assert!(!store.has_email(ACCOUNT, &EmailId::new("m0049")).unwrap());
    assert!(store.has_email(ACCOUNT, &EmailId::new("m0050")).unwrap());

    for n in 2_000..2_005 {
        service.add_message(remote(n, &["INBOX"]));
    }
    let result = engine.sync().await.unwrap();

    assert_eq!(result.new, 5);
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 1_000);
    assert!(store.has_email(ACCOUNT, &EmailId::new("m2004")).unwrap());
    assert!(!store.has_email(ACCOUNT, &EmailId::new("m0054")).unwrap());
    assert_eq!(
        store.get_sync_state(ACCOUNT).unwrap().unwrap().email_count,
        1_000
    );
    assert_store_consistent(store.as_ref());
}

#[tokio::test]
async fn test_sync_then_query() {
    init_logging();
    let service = mailbox(6);
    service.add_label("Label_1", "Receipts");
    let store = Arc::new(InMemoryMailStore::new());
    engine(&service, store.clone()).sync().await.unwrap();

    let threads = list_threads(store.as_ref(), ACCOUNT, 10, 0).unwrap();
    assert_eq!(threads.len(), 2);
    // Newest thread first
    assert_eq!(threads[0].id.as_str(), "t0001");
    assert_eq!(threads[0].subject, "Subject 1");

    let detail = get_thread_detail(store.as_ref(), ACCOUNT, &ThreadId::new("t0000"))
        .unwrap()
        .unwrap();
    assert_eq!(detail.messages.len(), 3);
    assert_eq!(detail.messages[0].id.as_str(), "m0000");

    let inbox = list_folder(store.as_ref(), ACCOUNT, LabelId::INBOX, 2, 0).unwrap();
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].id.as_str(), "m0005");

    let labels = store.list_labels(ACCOUNT).unwrap();
    assert!(labels.iter().any(|l| l.id.as_str() == "Label_1" && l.name == "Receipts"));
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    init_logging();
    let service = mailbox(20);
    let sqlite = SqliteMailStore::in_memory().unwrap();
    let account_id = sqlite.upsert_account(Account::new("me@example.com")).unwrap();
    assert_eq!(account_id, ACCOUNT);
    let store: Arc<dyn MailStore> = Arc::new(sqlite);
    let engine = engine(&service, store.clone());

    let result = engine.sync().await.unwrap();
    assert_eq!(result.new, 20);

    service.delete_message("m0019");
    service.remove_labels("m0000", &["UNREAD"]);
    let result = engine.sync().await.unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(result.updated, 1);

    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 19);
    assert!(store.get_account(ACCOUNT).unwrap().unwrap().last_sync_at.is_some());
    assert_store_consistent(store.as_ref());
}

/// Holds every `list_labels` call until released
struct GatedService {
    inner: Arc<InMemoryMailService>,
    gate: Arc<Notify>,
    entered: Arc<Notify>,
}

#[async_trait]
impl MailService for GatedService {
    async fn list_messages(&self, request: ListMessagesRequest) -> GmailResult<ListMessagesResponse> {
        self.inner.list_messages(request).await
    }

    async fn get_message(&self, id: &EmailId) -> GmailResult<GmailMessage> {
        self.inner.get_message(id).await
    }

    async fn modify_labels(
        &self,
        id: &EmailId,
        add: &[String],
        remove: &[String],
    ) -> GmailResult<GmailMessage> {
        self.inner.modify_labels(id, add, remove).await
    }

    async fn list_labels(&self) -> GmailResult<Vec<GmailLabel>> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.list_labels().await
    }

    async fn get_label(&self, id: &str) -> GmailResult<GmailLabel> {
        self.inner.get_label(id).await
    }

    async fn list_history(
        &self,
        start_history_id: &str,
        history_types: &[HistoryType],
        page_token: Option<&str>,
    ) -> GmailResult<HistoryResponse> {
        self.inner
            .list_history(start_history_id, history_types, page_token)
            .await
    }

    async fn get_profile(&self) -> GmailResult<ProfileResponse> {
        self.inner.get_profile().await
    }
}

#[tokio::test]
async fn test_concurrent_syncs_of_one_account_are_single_flight() {
    init_logging();
    let store = Arc::new(InMemoryMailStore::new());
    store.upsert_account(Account::new("me@example.com")).unwrap();
    let account = store.get_account(ACCOUNT).unwrap().unwrap();

    let gate = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let service: Arc<dyn MailService> = Arc::new(GatedService {
        inner: mailbox(4),
        gate: gate.clone(),
        entered: entered.clone(),
    });
    let coordinator = SyncCoordinator::new(
        store.clone(),
        move |_: &Account| -> Result<Arc<dyn MailService>> { Ok(service.clone()) },
        &SyncConfig::default(),
    );

    let first = {
        let coordinator = coordinator.clone();
        let account = account.clone();
        tokio::spawn(async move { coordinator.sync_account(&account).await })
    };

    // Wait until the first attempt is inside the engine
    entered.notified().await;
    assert!(coordinator.is_account_syncing(ACCOUNT));

    let second = coordinator.sync_account(&account).await;
    assert!(second.is_skipped());

    gate.notify_one();
    let first = first.await.unwrap();
    match first {
        SyncOutcome::Completed(result) => assert_eq!(result.new, 4),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!coordinator.is_account_syncing(ACCOUNT));
    assert_eq!(store.count_emails(ACCOUNT).unwrap(), 4);
}
