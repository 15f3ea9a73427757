//! Domain models for mirrored mail entities

mod account;
mod email;
mod label;
mod sync_state;
mod thread;

pub use account::{Account, AccountId};
pub use email::{Email, EmailAddress, EmailBuilder, EmailId};
pub use label::{Label, LabelId};
pub use sync_state::{SyncState, SyncStatus};
pub use thread::{EmailThread, ThreadId};
