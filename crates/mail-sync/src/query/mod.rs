//! Read-side queries over the local mirror
//!
//! Account-scoped listing functions for whatever renders the mailbox.

mod folder;
mod threads;

pub use folder::{EmailSummary, list_folder};
pub use threads::{ThreadDetail, ThreadSummary, get_thread_detail, list_threads, list_threads_by_label};
