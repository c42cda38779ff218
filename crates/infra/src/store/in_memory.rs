use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use stockroom_core::{ItemId, OperatorId, add_quantities};
use stockroom_inventory::{AuditEntry, PendingDelta};

use super::r#trait::{InventoryStore, ItemRecord, StoreError};

/// In-memory store.
///
/// Intended for tests/dev. `apply_deltas` validates the whole batch before
/// touching any row, under one write lock, so it is atomic like the SQLite
/// transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<BTreeMap<ItemId, ItemRecord>>,
    audit: RwLock<Vec<AuditEntry>>,
    operators: RwLock<HashMap<OperatorId, String>>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Storage(format!("{what} lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, item_id: ItemId, name: impl Into<String>, quantity: f64) -> Self {
        if let Ok(mut items) = self.items.write() {
            items.insert(item_id.clone(), ItemRecord::new(item_id, name, quantity));
        }
        self
    }

    pub fn with_operator(self, operator: OperatorId, credential: impl Into<String>) -> Self {
        if let Ok(mut operators) = self.operators.write() {
            operators.insert(operator, credential.into());
        }
        self
    }

    /// Stored quantity of one item, if present.
    pub fn quantity(&self, item_id: &ItemId) -> Option<f64> {
        self.items
            .read()
            .ok()
            .and_then(|items| items.get(item_id).map(|r| r.quantity))
    }

    /// Every persisted audit entry, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().map(|a| a.clone()).unwrap_or_default()
    }
}

impl InventoryStore for InMemoryStore {
    fn load_catalog(&self) -> Result<Vec<ItemRecord>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned("items"))?;
        Ok(items.values().cloned().collect())
    }

    fn apply_deltas(&self, deltas: &[PendingDelta]) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned("items"))?;

        let mut updated = Vec::with_capacity(deltas.len());
        for d in deltas {
            let record = items
                .get(&d.item_id)
                .ok_or_else(|| StoreError::NotFound(d.item_id.clone()))?;
            let quantity = add_quantities(record.quantity, d.delta);
            if quantity < 0.0 {
                return Err(StoreError::Constraint(format!(
                    "quantity of {} would become {quantity}",
                    d.item_id
                )));
            }
            updated.push((d.item_id.clone(), quantity));
        }

        for (item_id, quantity) in updated {
            if let Some(record) = items.get_mut(&item_id) {
                record.quantity = quantity;
            }
        }
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut audit = self.audit.write().map_err(|_| poisoned("audit"))?;
        audit.push(entry.clone());
        Ok(())
    }

    fn find_item(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned("items"))?;
        Ok(items.get(item_id).cloned())
    }

    fn verify_credentials(
        &self,
        operator: &OperatorId,
        credential: &str,
    ) -> Result<bool, StoreError> {
        let operators = self.operators.read().map_err(|_| poisoned("operators"))?;
        Ok(operators.get(operator).is_some_and(|c| c == credential))
    }

    fn audit_history(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, StoreError> {
        let audit = self.audit.read().map_err(|_| poisoned("audit"))?;
        Ok(audit
            .iter()
            .filter(|e| &e.item_id == item_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_item(id("A1"), "Widget", 10.0)
            .with_item(id("B2"), "Gadget", 1.0)
            .with_operator(OperatorId::new("1001").unwrap(), "Smith")
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = store();
        let batch = vec![
            PendingDelta {
                item_id: id("A1"),
                delta: 5.0,
            },
            PendingDelta {
                item_id: id("B2"),
                delta: -2.0,
            },
        ];

        assert!(matches!(
            store.apply_deltas(&batch),
            Err(StoreError::Constraint(_))
        ));
        assert_eq!(store.quantity(&id("A1")), Some(10.0));

        let missing = vec![
            PendingDelta {
                item_id: id("A1"),
                delta: 5.0,
            },
            PendingDelta {
                item_id: id("Z9"),
                delta: 1.0,
            },
        ];
        assert_eq!(
            store.apply_deltas(&missing),
            Err(StoreError::NotFound(id("Z9")))
        );
        assert_eq!(store.quantity(&id("A1")), Some(10.0));

        store.apply_deltas(&batch[..1]).unwrap();
        assert_eq!(store.quantity(&id("A1")), Some(15.0));
    }

    #[test]
    fn fractional_deltas_stay_on_scale() {
        let store = InMemoryStore::new().with_item(id("C3"), "Flour (kg)", 0.3);
        for delta in [-0.1, -0.2] {
            store
                .apply_deltas(&[PendingDelta {
                    item_id: id("C3"),
                    delta,
                }])
                .unwrap();
        }
        assert_eq!(store.quantity(&id("C3")), Some(0.0));
    }

    #[test]
    fn credentials_must_match() {
        let store = store();
        let op = OperatorId::new("1001").unwrap();
        assert!(store.verify_credentials(&op, "Smith").unwrap());
        assert!(!store.verify_credentials(&op, "smith").unwrap());
        assert!(
            !store
                .verify_credentials(&OperatorId::new("9").unwrap(), "Smith")
                .unwrap()
        );
    }
}
