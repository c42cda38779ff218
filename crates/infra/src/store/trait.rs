use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{ItemId, OperatorId, normalize_quantity};
use stockroom_inventory::{AuditEntry, Item, PendingDelta};

/// An item row as stored (identifier, display name, stored quantity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: f64,
}

impl ItemRecord {
    /// The quantity is rounded to the quantity scale.
    pub fn new(item_id: ItemId, name: impl Into<String>, quantity: f64) -> Self {
        Self {
            item_id,
            name: name.into(),
            quantity: normalize_quantity(quantity),
        }
    }
}

impl From<ItemRecord> for Item {
    fn from(record: ItemRecord) -> Self {
        Item::new(record.item_id, record.name, record.quantity)
    }
}

/// Store operation error.
///
/// These are **infrastructure errors** as opposed to the domain errors in
/// `stockroom_core::DomainError`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The store could not be reached (connection, runtime, filesystem).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write referenced an item the store does not have.
    #[error("item not found in store: {0}")]
    NotFound(ItemId),

    /// A write would break a stored constraint (e.g. negative quantity).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Any other storage failure, including malformed rows.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistent store collaborator.
///
/// Every call is self-contained: implementations acquire whatever
/// connection they need, use it, and release it before returning, on error
/// paths as well.
pub trait InventoryStore: Send + Sync {
    /// Every item with its stored quantity, in identifier order.
    fn load_catalog(&self) -> Result<Vec<ItemRecord>, StoreError>;

    /// Add each delta to the stored quantity, all or nothing.
    ///
    /// The write is a relative add (`quantity = quantity + delta`), never an
    /// overwrite, so it composes with changes made by other writers.
    fn apply_deltas(&self, deltas: &[PendingDelta]) -> Result<(), StoreError>;

    /// Append one audit entry to the change log.
    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    fn find_item(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError>;

    /// `true` when the operator exists and the secondary credential matches.
    fn verify_credentials(&self, operator: &OperatorId, credential: &str)
    -> Result<bool, StoreError>;

    /// Persisted audit entries for one item, oldest first.
    fn audit_history(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn load_catalog(&self) -> Result<Vec<ItemRecord>, StoreError> {
        (**self).load_catalog()
    }

    fn apply_deltas(&self, deltas: &[PendingDelta]) -> Result<(), StoreError> {
        (**self).apply_deltas(deltas)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        (**self).append_audit(entry)
    }

    fn find_item(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        (**self).find_item(item_id)
    }

    fn verify_credentials(
        &self,
        operator: &OperatorId,
        credential: &str,
    ) -> Result<bool, StoreError> {
        (**self).verify_credentials(operator, credential)
    }

    fn audit_history(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, StoreError> {
        (**self).audit_history(item_id)
    }
}
