//! Adjustment ledger: net pending deltas over the loaded catalog.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::{
    DomainError, DomainResult, Entity, ItemId, OperatorId, add_quantities, normalize_quantity,
};

use crate::audit::{AuditEntry, AuditLog};
use crate::catalog::Catalog;

/// Net uncommitted change for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelta {
    pub item_id: ItemId,
    pub delta: f64,
}

/// Owns the catalog, the pending deltas, and the session audit log.
///
/// This is the single place that computes displayed quantities: for every
/// item, `current == original + pending` (on the quantity scale) holds after
/// each call to [`AdjustmentLedger::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentLedger {
    catalog: Catalog,
    pending: BTreeMap<ItemId, f64>,
    audit: AuditLog,
}

impl AdjustmentLedger {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            pending: BTreeMap::new(),
            audit: AuditLog::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn audit_mut(&mut self) -> &mut AuditLog {
        &mut self.audit
    }

    /// Apply an already validated signed delta.
    ///
    /// Updates the catalog quantity, folds the delta into the item's pending
    /// entry, and records one audit entry. The delta is rounded to the
    /// quantity scale first; one that rounds to zero changes nothing and
    /// records nothing. Returns the new quantity.
    pub fn apply(
        &mut self,
        item_id: &ItemId,
        signed_delta: f64,
        actor: &OperatorId,
        at: DateTime<Utc>,
    ) -> DomainResult<f64> {
        let item = self
            .catalog
            .get(item_id)
            .ok_or_else(|| DomainError::item_not_found(item_id))?;
        let item_name = item.name().to_string();
        let original = item.quantity();

        if !signed_delta.is_finite() {
            return Err(DomainError::not_a_number(signed_delta.to_string()));
        }
        let signed_delta = normalize_quantity(signed_delta);
        if signed_delta == 0.0 {
            return Ok(original);
        }

        let new_quantity = add_quantities(original, signed_delta);
        if new_quantity < 0.0 {
            tracing::error!(
                item_id = %item_id,
                original,
                delta = signed_delta,
                "rejected delta that would leave negative stock"
            );
            return Err(DomainError::NegativeResult {
                item_id: item_id.clone(),
                result: new_quantity,
            });
        }

        self.catalog.set_quantity(item_id, new_quantity)?;

        let net = add_quantities(self.pending(item_id), signed_delta);
        if net == 0.0 {
            self.pending.remove(item_id);
        } else {
            self.pending.insert(item_id.clone(), net);
        }

        self.audit.record(AuditEntry {
            entry_id: Uuid::now_v7(),
            item_id: item_id.clone(),
            item_name,
            original_quantity: original,
            new_quantity,
            delta: signed_delta,
            actor: actor.clone(),
            recorded_at: at,
        });

        tracing::debug!(
            item_id = %item_id,
            delta = signed_delta,
            net,
            new_quantity,
            "applied delta"
        );
        Ok(new_quantity)
    }

    /// Net pending delta for an item (zero when there is none).
    pub fn pending(&self, item_id: &ItemId) -> f64 {
        self.pending.get(item_id).copied().unwrap_or(0.0)
    }

    /// Snapshot of pending deltas in identifier order.
    pub fn pending_deltas(&self) -> Vec<PendingDelta> {
        self.pending
            .iter()
            .map(|(item_id, delta)| PendingDelta {
                item_id: item_id.clone(),
                delta: *delta,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Called after the pending deltas were persisted.
    ///
    /// Clears the ledger and makes the current quantities the new originals,
    /// which keeps `current == original + pending` true.
    pub fn mark_committed(&mut self) {
        self.pending.clear();
        self.catalog.rebase();
    }
}
