//! Gmail API integration
//!
//! This module provides:
//! - The `MailService` contract the sync engine consumes
//! - Typed service errors and batch results
//! - Response normalization to domain models
//! - An in-memory service for tests and offline runs

mod batch;
mod error;
mod memory;
mod normalize;
mod service;

pub use batch::{BatchFailure, BatchResult};
pub use error::{GmailError, GmailResult};
pub use memory::InMemoryMailService;
pub use normalize::normalize_message;
pub use service::{HistoryType, ListMessagesRequest, MailService};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: String,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since epoch, as a decimal string
        pub internal_date: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (base64url encoded)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from users.history.list
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        /// Cursor to resume from next time
        pub history_id: Option<String>,
        pub next_page_token: Option<String>,
    }

    /// One history entry; any combination of change lists may be present
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: String,
        pub messages_added: Option<Vec<HistoryMessage>>,
        pub messages_deleted: Option<Vec<HistoryMessage>>,
        pub labels_added: Option<Vec<HistoryLabelChange>>,
        pub labels_removed: Option<Vec<HistoryLabelChange>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HistoryMessage {
        pub message: MessageRef,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryLabelChange {
        pub message: MessageRef,
        #[serde(default)]
        pub label_ids: Vec<String>,
    }

    /// Response from users.labels.list
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<GmailLabel>>,
    }

    /// Label definition
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailLabel {
        pub id: String,
        pub name: String,
        /// "system" or "user"
        #[serde(rename = "type")]
        pub label_type: Option<String>,
        pub messages_total: Option<u32>,
        pub messages_unread: Option<u32>,
    }

    /// Response from users.getProfile
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        pub messages_total: Option<u64>,
        pub threads_total: Option<u64>,
        pub history_id: String,
    }

}
