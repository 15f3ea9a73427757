//! Storage traits and implementations
//!
//! This module defines the record store abstraction the sync engine writes
//! through. The trait-based design allows swapping between in-memory and
//! persistent storage implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;
