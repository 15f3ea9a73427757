//! Folding history records into one consolidated change per message

use std::collections::{BTreeMap, BTreeSet};

use crate::gmail::api::HistoryRecord;
use crate::models::EmailId;

/// Everything one incremental pass learned about a single message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDelta {
    pub is_deleted: bool,
    pub needs_full_refetch: bool,
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl MessageDelta {
    /// True when only labels changed
    pub fn is_label_only(&self) -> bool {
        !self.is_deleted && !self.needs_full_refetch
    }

    fn add_labels(&mut self, labels: &[String]) {
        for label in labels {
            self.to_remove.remove(label);
            self.to_add.insert(label.clone());
        }
    }

    fn remove_labels(&mut self, labels: &[String]) {
        for label in labels {
            self.to_add.remove(label);
            self.to_remove.insert(label.clone());
        }
    }
}

/// Fold history records, in order, into one delta per message id
///
/// Records for the same message accumulate onto one entry, so applying the
/// result costs at most one fetch per changed message. When a label is both
/// added and removed within the window, the later record wins.
pub fn fold_history(records: &[HistoryRecord]) -> BTreeMap<EmailId, MessageDelta> {
    let mut deltas: BTreeMap<EmailId, MessageDelta> = BTreeMap::new();

    for record in records {
        for added in record.messages_added.iter().flatten() {
            entry(&mut deltas, &added.message.id).needs_full_refetch = true;
        }
        for deleted in record.messages_deleted.iter().flatten() {
            entry(&mut deltas, &deleted.message.id).is_deleted = true;
        }
        for change in record.labels_added.iter().flatten() {
            entry(&mut deltas, &change.message.id).add_labels(&change.label_ids);
        }
        for change in record.labels_removed.iter().flatten() {
            entry(&mut deltas, &change.message.id).remove_labels(&change.label_ids);
        }
    }

    deltas
}

fn entry<'a>(deltas: &'a mut BTreeMap<EmailId, MessageDelta>, id: &str) -> &'a mut MessageDelta {
    deltas.entry(EmailId::new(id)).or_default()
}
