//! Email model representing a locally mirrored Gmail message

use super::{AccountId, LabelId, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EmailId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmailId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse a header value like "John Doe <john@example.com>"
    ///
    /// Surrounding quotes on the display name are dropped. Anything without
    /// angle brackets is taken as a bare address.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(open) = s.rfind('<')
            && let Some(close) = s.rfind('>')
            && open < close
        {
            let name = s[..open].trim().trim_matches('"').trim();
            let email = s[open + 1..close].trim();
            return Self {
                name: (!name.is_empty()).then(|| name.to_string()),
                email: email.to_string(),
            };
        }

        Self::new(s)
    }

    /// Lowercased address, used for participant sets
    pub fn normalized(&self) -> String {
        self.email.to_ascii_lowercase()
    }

    /// Format the address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A single mirrored message
///
/// `is_read` and `is_starred` are derived from the label set and are only
/// ever recomputed through [`Email::set_labels`] / [`Email::apply_label_changes`],
/// so they cannot drift from `labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EmailRecord")]
pub struct Email {
    /// Gmail message ID
    pub id: EmailId,
    /// Owning account
    pub account_id: AccountId,
    /// Gmail thread ID
    pub thread_id: ThreadId,
    /// Sender
    pub from: EmailAddress,
    /// Recipients (To field)
    pub to: Vec<EmailAddress>,
    /// CC recipients
    pub cc: Vec<EmailAddress>,
    /// Subject line
    pub subject: String,
    /// Plain text preview
    pub snippet: String,
    /// When the message was received
    pub received_at: DateTime<Utc>,
    /// Gmail's internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    /// Gmail label IDs, including system tags such as UNREAD and STARRED
    labels: BTreeSet<String>,
    /// `!labels.contains("UNREAD")`
    is_read: bool,
    /// `labels.contains("STARRED")`
    is_starred: bool,
    /// Plain text body, when fetched
    pub body_text: Option<String>,
    /// HTML body, when fetched
    pub body_html: Option<String>,
}

/// Serialized shape of an `Email`; the flags are rebuilt from `labels`
///
/// Any `is_read` / `is_starred` in the input is ignored.
#[derive(Deserialize)]
struct EmailRecord {
    id: EmailId,
    account_id: AccountId,
    thread_id: ThreadId,
    from: EmailAddress,
    #[serde(default)]
    to: Vec<EmailAddress>,
    #[serde(default)]
    cc: Vec<EmailAddress>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    snippet: String,
    received_at: DateTime<Utc>,
    internal_date: i64,
    #[serde(default)]
    labels: BTreeSet<String>,
    #[serde(default)]
    body_text: Option<String>,
    #[serde(default)]
    body_html: Option<String>,
}

impl From<EmailRecord> for Email {
    fn from(record: EmailRecord) -> Self {
        let mut email = Email {
            id: record.id,
            account_id: record.account_id,
            thread_id: record.thread_id,
            from: record.from,
            to: record.to,
            cc: record.cc,
            subject: record.subject,
            snippet: record.snippet,
            received_at: record.received_at,
            internal_date: record.internal_date,
            labels: BTreeSet::new(),
            is_read: true,
            is_starred: false,
            body_text: record.body_text,
            body_html: record.body_html,
        };
        email.set_labels(record.labels);
        email
    }
}

impl Email {
    pub fn builder(id: EmailId, account_id: AccountId, thread_id: ThreadId) -> EmailBuilder {
        EmailBuilder::new(id, account_id, thread_id)
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn is_starred(&self) -> bool {
        self.is_starred
    }

    /// Replace the label set and recompute the derived flags
    pub fn set_labels<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self.refresh_flags();
    }

    /// Apply `labels ∪ add \ remove` and recompute the derived flags
    ///
    /// Returns true if the label set changed.
    pub fn apply_label_changes(&mut self, add: &BTreeSet<String>, remove: &BTreeSet<String>) -> bool {
        let before = self.labels.clone();
        self.labels.extend(add.iter().cloned());
        self.labels.retain(|l| !remove.contains(l));
        self.refresh_flags();
        before != self.labels
    }

    fn refresh_flags(&mut self) {
        self.is_read = !self.labels.contains(LabelId::UNREAD);
        self.is_starred = self.labels.contains(LabelId::STARRED);
    }

    /// All addresses appearing on this message, normalized
    pub fn participants(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.from)
            .chain(self.to.iter())
            .chain(self.cc.iter())
            .filter(|a| !a.email.is_empty())
            .map(EmailAddress::normalized)
    }
}

/// Builder for creating Email instances
pub struct EmailBuilder {
    id: EmailId,
    account_id: AccountId,
    thread_id: ThreadId,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    subject: String,
    snippet: String,
    received_at: Option<DateTime<Utc>>,
    internal_date: Option<i64>,
    labels: BTreeSet<String>,
    body_text: Option<String>,
    body_html: Option<String>,
}

impl EmailBuilder {
    fn new(id: EmailId, account_id: AccountId, thread_id: ThreadId) -> Self {
        Self {
            id,
            account_id,
            thread_id,
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            subject: String::new(),
            snippet: String::new(),
            received_at: None,
            internal_date: None,
            labels: BTreeSet::new(),
            body_text: None,
            body_html: None,
        }
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn cc(mut self, cc: Vec<EmailAddress>) -> Self {
        self.cc = cc;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn internal_date(mut self, internal_date: i64) -> Self {
        self.internal_date = Some(internal_date);
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn body_text(mut self, body_text: Option<String>) -> Self {
        self.body_text = body_text;
        self
    }

    pub fn body_html(mut self, body_html: Option<String>) -> Self {
        self.body_html = body_html;
        self
    }

    pub fn build(self) -> Email {
        let received_at = self.received_at.unwrap_or_else(Utc::now);
        let mut email = Email {
            id: self.id,
            account_id: self.account_id,
            thread_id: self.thread_id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com")),
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            snippet: self.snippet,
            received_at,
            internal_date: self
                .internal_date
                .unwrap_or_else(|| received_at.timestamp_millis()),
            labels: BTreeSet::new(),
            is_read: true,
            is_starred: false,
            body_text: self.body_text,
            body_html: self.body_html,
        };
        email.set_labels(self.labels);
        email
    }
}
