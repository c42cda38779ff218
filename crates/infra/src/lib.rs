//! Infrastructure layer: persistent store adapters and the commit path.

pub mod audit;
pub mod commit;
pub mod store;

pub use audit::AuditRecorder;
pub use commit::{CommitCoordinator, CommitError, CommitReport};
pub use store::{InMemoryStore, InventoryStore, ItemRecord, SqliteStore, StoreError};
