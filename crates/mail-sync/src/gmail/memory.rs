//! In-memory mail service
//!
//! A self-contained mailbox that speaks the `MailService` contract: paginated
//! listing, full messages, label definitions, a monotonically increasing
//! history log, history expiry and per-message failure injection. Used by the
//! test suites and for offline runs of the sync stack.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::api::{
    GmailLabel, GmailMessage, Header, HistoryLabelChange, HistoryMessage, HistoryRecord,
    HistoryResponse, ListMessagesResponse, MessageBody, MessagePayload, MessageRef,
    ProfileResponse,
};
use super::{GmailError, GmailResult, HistoryType, ListMessagesRequest, MailService};
use crate::models::EmailId;

/// First history id handed out by a fresh mailbox
const INITIAL_HISTORY_ID: u64 = 1000;

/// Gmail refuses pages larger than this
const MAX_PAGE_SIZE: usize = 500;

#[derive(Default)]
struct Mailbox {
    messages: HashMap<String, GmailMessage>,
    labels: BTreeMap<String, GmailLabel>,
    /// (history id, record), ascending
    history: Vec<(u64, HistoryRecord)>,
    history_id: u64,
    /// Cursors below this are reported as expired
    history_floor: u64,
    failing_messages: HashSet<String>,
    history_error: Option<GmailError>,
    profile_error: Option<GmailError>,
    get_message_calls: HashMap<String, usize>,
    list_calls: usize,
    history_calls: usize,
}

impl Mailbox {
    fn record(&mut self, record: HistoryRecord) {
        self.history_id += 1;
        let id = self.history_id;
        self.history.push((
            id,
            HistoryRecord {
                id: id.to_string(),
                ..record
            },
        ));
    }
}

/// In-memory implementation of `MailService`
pub struct InMemoryMailService {
    email_address: String,
    history_page_size: usize,
    state: Mutex<Mailbox>,
}

impl InMemoryMailService {
    /// Create an empty mailbox with the standard system labels
    pub fn new(email_address: impl Into<String>) -> Self {
        let mut mailbox = Mailbox {
            history_id: INITIAL_HISTORY_ID,
            ..Mailbox::default()
        };
        for id in ["INBOX", "SENT", "DRAFT", "TRASH", "SPAM", "STARRED", "IMPORTANT", "UNREAD"] {
            mailbox.labels.insert(
                id.to_string(),
                GmailLabel {
                    id: id.to_string(),
                    name: id.to_string(),
                    label_type: Some("system".to_string()),
                    messages_total: None,
                    messages_unread: None,
                },
            );
        }

        Self {
            email_address: email_address.into(),
            history_page_size: 100,
            state: Mutex::new(mailbox),
        }
    }

    /// Page size used for `list_history` responses
    pub fn with_history_page_size(mut self, size: usize) -> Self {
        self.history_page_size = size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, Mailbox> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a minimal full-format message
    pub fn make_message(
        id: &str,
        thread_id: &str,
        from: &str,
        subject: &str,
        internal_date: i64,
        labels: &[&str],
    ) -> GmailMessage {
        GmailMessage {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            label_ids: Some(labels.iter().map(|l| l.to_string()).collect()),
            snippet: format!("Snippet for {}", id),
            internal_date: internal_date.to_string(),
            payload: Some(MessagePayload {
                headers: Some(vec![
                    Header {
                        name: "From".to_string(),
                        value: from.to_string(),
                    },
                    Header {
                        name: "Subject".to_string(),
                        value: subject.to_string(),
                    },
                ]),
                body: Some(MessageBody {
                    size: None,
                    data: None,
                }),
                parts: None,
                mime_type: Some("text/plain".to_string()),
            }),
        }
    }

    /// Add or replace a user label definition
    pub fn add_label(&self, id: &str, name: &str) {
        self.state().labels.insert(
            id.to_string(),
            GmailLabel {
                id: id.to_string(),
                name: name.to_string(),
                label_type: Some("user".to_string()),
                messages_total: None,
                messages_unread: None,
            },
        );
    }

    /// Remove a label definition without touching messages
    pub fn remove_label(&self, id: &str) {
        self.state().labels.remove(id);
    }

    /// Put a message in the mailbox without recording history
    ///
    /// Models mail that existed before any cursor was issued.
    pub fn seed_message(&self, message: GmailMessage) {
        self.state().messages.insert(message.id.clone(), message);
    }

    /// Deliver a new message and record a messageAdded entry
    pub fn add_message(&self, message: GmailMessage) {
        let mut state = self.state();
        let message_ref = message_ref(&message);
        state.messages.insert(message.id.clone(), message);
        state.record(HistoryRecord {
            messages_added: Some(vec![HistoryMessage {
                message: message_ref,
            }]),
            ..HistoryRecord::default()
        });
    }

    /// Remove a message and record a messageDeleted entry
    pub fn delete_message(&self, id: &str) {
        let mut state = self.state();
        if let Some(message) = state.messages.remove(id) {
            let message_ref = message_ref(&message);
            state.record(HistoryRecord {
                messages_deleted: Some(vec![HistoryMessage {
                    message: message_ref,
                }]),
                ..HistoryRecord::default()
            });
        }
    }

    /// Add labels to a message and record a labelAdded entry
    pub fn add_labels(&self, id: &str, labels: &[&str]) {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.state().apply_labels(id, &labels, &[]);
    }

    /// Remove labels from a message and record a labelRemoved entry
    pub fn remove_labels(&self, id: &str, labels: &[&str]) {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.state().apply_labels(id, &[], &labels);
    }

    /// Invalidate every cursor issued so far
    pub fn expire_history(&self) {
        let mut state = self.state();
        state.history_id += 1;
        state.history_floor = state.history_id;
        state.history.clear();
    }

    /// Make `get_message` fail with a server error for this id
    pub fn fail_message(&self, id: &str) {
        self.state().failing_messages.insert(id.to_string());
    }

    /// Make `list_history` fail until cleared
    pub fn set_history_error(&self, error: Option<GmailError>) {
        self.state().history_error = error;
    }

    /// Make `get_profile` fail until cleared
    pub fn set_profile_error(&self, error: Option<GmailError>) {
        self.state().profile_error = error;
    }

    /// Current history id, as `get_profile` would report it
    pub fn current_history_id(&self) -> String {
        self.state().history_id.to_string()
    }

    pub fn message_count(&self) -> usize {
        self.state().messages.len()
    }

    /// Number of `get_message` calls made for one id
    pub fn get_message_calls(&self, id: &str) -> usize {
        self.state().get_message_calls.get(id).copied().unwrap_or(0)
    }

    /// Number of `get_message` calls made for all ids
    pub fn total_get_message_calls(&self) -> usize {
        self.state().get_message_calls.values().sum()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn history_calls(&self) -> usize {
        self.state().history_calls
    }
}

impl Mailbox {
    fn apply_labels(&mut self, id: &str, add: &[String], remove: &[String]) -> Option<GmailMessage> {
        let message = self.messages.get_mut(id)?;
        let labels = message.label_ids.get_or_insert_with(Vec::new);
        for label in add {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels.retain(|l| !remove.contains(l));
        let updated = message.clone();
        let message_ref = message_ref(&updated);

        if !add.is_empty() {
            self.record(HistoryRecord {
                labels_added: Some(vec![HistoryLabelChange {
                    message: message_ref.clone(),
                    label_ids: add.to_vec(),
                }]),
                ..HistoryRecord::default()
            });
        }
        if !remove.is_empty() {
            self.record(HistoryRecord {
                labels_removed: Some(vec![HistoryLabelChange {
                    message: message_ref,
                    label_ids: remove.to_vec(),
                }]),
                ..HistoryRecord::default()
            });
        }
        Some(updated)
    }
}

fn message_ref(message: &GmailMessage) -> MessageRef {
    MessageRef {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
    }
}

/// Keep only the change lists whose kind was requested
fn filter_record(record: &HistoryRecord, types: &[HistoryType]) -> Option<HistoryRecord> {
    let wants = |kind| types.is_empty() || types.contains(&kind);
    let filtered = HistoryRecord {
        id: record.id.clone(),
        messages_added: record
            .messages_added
            .clone()
            .filter(|_| wants(HistoryType::MessageAdded)),
        messages_deleted: record
            .messages_deleted
            .clone()
            .filter(|_| wants(HistoryType::MessageDeleted)),
        labels_added: record
            .labels_added
            .clone()
            .filter(|_| wants(HistoryType::LabelAdded)),
        labels_removed: record
            .labels_removed
            .clone()
            .filter(|_| wants(HistoryType::LabelRemoved)),
    };
    let empty = filtered.messages_added.is_none()
        && filtered.messages_deleted.is_none()
        && filtered.labels_added.is_none()
        && filtered.labels_removed.is_none();
    (!empty).then_some(filtered)
}

fn parse_page_token(token: Option<&str>) -> GmailResult<usize> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| GmailError::Decode(format!("invalid page token: {}", t))),
    }
}

#[async_trait]
impl MailService for InMemoryMailService {
    async fn list_messages(&self, request: ListMessagesRequest) -> GmailResult<ListMessagesResponse> {
        let mut state = self.state();
        state.list_calls += 1;

        let mut matching: Vec<&GmailMessage> = state
            .messages
            .values()
            .filter(|m| {
                let labels = m.label_ids.as_deref().unwrap_or_default();
                request.label_ids.iter().all(|l| labels.contains(l))
            })
            .collect();
        // Newest first, like the real API
        matching.sort_by(|a, b| {
            let a_date: i64 = a.internal_date.parse().unwrap_or(0);
            let b_date: i64 = b.internal_date.parse().unwrap_or(0);
            b_date.cmp(&a_date).then_with(|| a.id.cmp(&b.id))
        });

        let offset = parse_page_token(request.page_token.as_deref())?;
        let page_size = request.max_results.clamp(1, MAX_PAGE_SIZE);
        let page: Vec<MessageRef> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|m| message_ref(m))
            .collect();
        let next = offset + page.len();

        Ok(ListMessagesResponse {
            next_page_token: (next < matching.len()).then(|| next.to_string()),
            result_size_estimate: Some(matching.len() as u32),
            messages: (!page.is_empty()).then_some(page),
        })
    }

    async fn get_message(&self, id: &EmailId) -> GmailResult<GmailMessage> {
        let mut state = self.state();
        *state
            .get_message_calls
            .entry(id.as_str().to_string())
            .or_default() += 1;

        if state.failing_messages.contains(id.as_str()) {
            return Err(GmailError::Server {
                status: 500,
                message: format!("backend error fetching {}", id),
            });
        }
        state
            .messages
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| GmailError::NotFound(format!("message {}", id)))
    }

    async fn modify_labels(
        &self,
        id: &EmailId,
        add: &[String],
        remove: &[String],
    ) -> GmailResult<GmailMessage> {
        self.state()
            .apply_labels(id.as_str(), add, remove)
            .ok_or_else(|| GmailError::NotFound(format!("message {}", id)))
    }

    async fn list_labels(&self) -> GmailResult<Vec<GmailLabel>> {
        Ok(self.state().labels.values().cloned().collect())
    }

    async fn get_label(&self, id: &str) -> GmailResult<GmailLabel> {
        let state = self.state();
        let mut label = state
            .labels
            .get(id)
            .cloned()
            .ok_or_else(|| GmailError::NotFound(format!("label {}", id)))?;

        let carrying: Vec<&GmailMessage> = state
            .messages
            .values()
            .filter(|m| m.label_ids.as_deref().unwrap_or_default().iter().any(|l| l == id))
            .collect();
        let unread = carrying
            .iter()
            .filter(|m| {
                m.label_ids
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|l| l == "UNREAD")
            })
            .count();
        label.messages_total = Some(carrying.len() as u32);
        label.messages_unread = Some(unread as u32);
        Ok(label)
    }

    async fn list_history(
        &self,
        start_history_id: &str,
        history_types: &[HistoryType],
        page_token: Option<&str>,
    ) -> GmailResult<HistoryResponse> {
        let mut state = self.state();
        state.history_calls += 1;

        if let Some(error) = state.history_error.clone() {
            return Err(error);
        }

        let start: u64 = start_history_id
            .parse()
            .map_err(|_| GmailError::NotFound(format!("historyId {}", start_history_id)))?;
        if start < state.history_floor {
            return Err(GmailError::NotFound(format!(
                "historyId {} is no longer available",
                start_history_id
            )));
        }

        let records: Vec<HistoryRecord> = state
            .history
            .iter()
            .filter(|(id, _)| *id > start)
            .filter_map(|(_, record)| filter_record(record, history_types))
            .collect();

        let offset = parse_page_token(page_token)?;
        let page: Vec<HistoryRecord> = records
            .iter()
            .skip(offset)
            .take(self.history_page_size)
            .cloned()
            .collect();
        let next = offset + page.len();

        Ok(HistoryResponse {
            history: (!page.is_empty()).then_some(page),
            history_id: Some(state.history_id.to_string()),
            next_page_token: (next < records.len()).then(|| next.to_string()),
        })
    }

    async fn get_profile(&self) -> GmailResult<ProfileResponse> {
        let state = self.state();
        if let Some(error) = state.profile_error.clone() {
            return Err(error);
        }
        Ok(ProfileResponse {
            email_address: self.email_address.clone(),
            messages_total: Some(state.messages.len() as u64),
            threads_total: None,
            history_id: state.history_id.to_string(),
        })
    }
}
