use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ItemId, normalize_quantity};

/// A stocked item as loaded from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    quantity: f64,
}

impl Item {
    /// The quantity is rounded to the quantity scale.
    pub fn new(id: ItemId, name: impl Into<String>, quantity: f64) -> Self {
        Self {
            id,
            name: name.into(),
            quantity: normalize_quantity(quantity),
        }
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CatalogEntry {
    item: Item,
    /// Quantity at load time (or at the last successful commit).
    original: f64,
}

/// Snapshot of every item in the shop, keyed by identifier.
///
/// Loaded once per session. Item identity is fixed; quantities only change
/// through [`crate::AdjustmentLedger::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: BTreeMap<ItemId, CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from loaded items.
    ///
    /// Rejects duplicate identifiers and quantities that are negative or not
    /// finite, since either would break the ledger's invariants from the start.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> DomainResult<Self> {
        let mut entries = BTreeMap::new();
        for mut item in items {
            item.quantity = normalize_quantity(item.quantity);
            if !item.quantity.is_finite() || item.quantity < 0.0 {
                return Err(DomainError::NegativeResult {
                    item_id: item.id.clone(),
                    result: item.quantity,
                });
            }
            let id = item.id.clone();
            let original = item.quantity;
            if entries
                .insert(id.clone(), CatalogEntry { item, original })
                .is_some()
            {
                return Err(DomainError::invalid_id(format!("duplicate item id {id}")));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.entries.contains_key(item_id)
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&Item> {
        self.entries.get(item_id).map(|e| &e.item)
    }

    /// Items in identifier order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.entries.values().map(|e| &e.item)
    }

    pub fn current_quantity(&self, item_id: &ItemId) -> DomainResult<f64> {
        self.entry(item_id).map(|e| e.item.quantity)
    }

    pub fn original_quantity(&self, item_id: &ItemId) -> DomainResult<f64> {
        self.entry(item_id).map(|e| e.original)
    }

    /// Case-insensitive match on name, or substring match on identifier.
    ///
    /// An empty (or all-whitespace) query returns every item.
    pub fn search(&self, query: &str) -> Vec<&Item> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.items().collect();
        }
        self.items()
            .filter(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item.id.as_str().to_lowercase().contains(&needle)
            })
            .collect()
    }

    fn entry(&self, item_id: &ItemId) -> DomainResult<&CatalogEntry> {
        self.entries
            .get(item_id)
            .ok_or_else(|| DomainError::item_not_found(item_id))
    }

    pub(crate) fn set_quantity(&mut self, item_id: &ItemId, quantity: f64) -> DomainResult<()> {
        let entry = self
            .entries
            .get_mut(item_id)
            .ok_or_else(|| DomainError::item_not_found(item_id))?;
        entry.item.quantity = normalize_quantity(quantity);
        Ok(())
    }

    /// Current quantities become the new originals (after a commit).
    pub(crate) fn rebase(&mut self) {
        for entry in self.entries.values_mut() {
            entry.original = entry.item.quantity;
        }
    }
}
