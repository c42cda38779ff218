//! Persistent store boundary.
//!
//! The rest of the system only sees [`InventoryStore`]. Two implementations
//! ship: [`SqliteStore`] for the shop's local database and [`InMemoryStore`]
//! for tests and demos.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use r#trait::{InventoryStore, ItemRecord, StoreError};
pub use sqlite::SqliteStore;
