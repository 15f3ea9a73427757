//! The mail service contract consumed by the sync engine
//!
//! HTTP transport, retries and OAuth live behind implementations of this
//! trait; the engine only sees typed requests, responses and `GmailError`s.

use async_trait::async_trait;

use super::api::{GmailLabel, GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse};
use super::{BatchResult, GmailResult};
use crate::models::EmailId;

/// Kinds of history records the delta call can be filtered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryType {
    MessageAdded,
    MessageDeleted,
    LabelAdded,
    LabelRemoved,
}

impl HistoryType {
    /// Every kind the incremental sync cares about
    pub const ALL: [HistoryType; 4] = [
        HistoryType::MessageAdded,
        HistoryType::MessageDeleted,
        HistoryType::LabelAdded,
        HistoryType::LabelRemoved,
    ];

    /// Value of the `historyTypes` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::MessageAdded => "messageAdded",
            HistoryType::MessageDeleted => "messageDeleted",
            HistoryType::LabelAdded => "labelAdded",
            HistoryType::LabelRemoved => "labelRemoved",
        }
    }
}

/// Parameters for users.messages.list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListMessagesRequest {
    /// Gmail search query (e.g. "newer_than:7d")
    pub query: Option<String>,
    /// Only messages carrying all of these labels
    pub label_ids: Vec<String>,
    /// Page size (the API caps this at 500)
    pub max_results: usize,
    pub page_token: Option<String>,
}

impl ListMessagesRequest {
    pub fn page(max_results: usize, page_token: Option<String>) -> Self {
        Self {
            max_results,
            page_token,
            ..Self::default()
        }
    }
}

/// Typed access to one account's remote mailbox
#[async_trait]
pub trait MailService: Send + Sync {
    /// List message summaries, newest first
    async fn list_messages(&self, request: ListMessagesRequest) -> GmailResult<ListMessagesResponse>;

    /// Fetch one full message
    async fn get_message(&self, id: &EmailId) -> GmailResult<GmailMessage>;

    /// Fetch many full messages
    ///
    /// The default issues one `get_message` per id and partitions the
    /// outcomes. Implementations backed by a real batch endpoint should
    /// override it.
    async fn batch_get_messages(&self, ids: &[EmailId]) -> BatchResult<GmailMessage> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push((id.as_str(), self.get_message(id).await));
        }
        BatchResult::from_results(results)
    }

    /// Add and remove labels on a message, returning the updated message
    async fn modify_labels(
        &self,
        id: &EmailId,
        add: &[String],
        remove: &[String],
    ) -> GmailResult<GmailMessage>;

    /// List every label definition
    async fn list_labels(&self) -> GmailResult<Vec<GmailLabel>>;

    /// Fetch one label definition with its counters
    async fn get_label(&self, id: &str) -> GmailResult<GmailLabel>;

    /// List history records after `start_history_id`
    ///
    /// Returns `GmailError::NotFound` when the cursor has expired.
    async fn list_history(
        &self,
        start_history_id: &str,
        history_types: &[HistoryType],
        page_token: Option<&str>,
    ) -> GmailResult<HistoryResponse>;

    /// Fetch the account profile, including the current history id
    async fn get_profile(&self) -> GmailResult<ProfileResponse>;
}
