//! Commit path: push the ledger's pending deltas to the store.
//!
//! The order is fixed:
//! 1. flush queued audit entries (so the trail is never behind the data),
//! 2. check that every pending item still exists in the store,
//! 3. apply all deltas in one all-or-nothing write,
//! 4. clear the ledger.
//!
//! Any failure before step 4 leaves the ledger exactly as it was, so the
//! operator can retry the same commit later.

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use stockroom_inventory::{AdjustmentLedger, PendingDelta};

use crate::audit::AuditRecorder;
use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommitError {
    /// The store rejected or could not take the write; nothing was cleared.
    #[error("commit failed: {0}")]
    CommitFailed(#[from] StoreError),
}

/// What a successful commit wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub batch_id: Uuid,
    pub committed: Vec<PendingDelta>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CommitCoordinator<S> {
    recorder: AuditRecorder<S>,
}

impl<S: InventoryStore> CommitCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            recorder: AuditRecorder::new(store),
        }
    }

    pub fn recorder(&self) -> &AuditRecorder<S> {
        &self.recorder
    }

    /// Persist the ledger. An empty ledger is a successful no-op.
    #[instrument(skip(self, ledger), fields(pending = ledger.pending_deltas().len()))]
    pub fn commit(&self, ledger: &mut AdjustmentLedger) -> Result<CommitReport, CommitError> {
        let batch_id = Uuid::now_v7();
        if ledger.is_empty() {
            return Ok(CommitReport {
                batch_id,
                committed: Vec::new(),
            });
        }

        let deltas = ledger.pending_deltas();
        match self.write(ledger, &deltas) {
            Ok(()) => {
                ledger.mark_committed();
                info!(%batch_id, items = deltas.len(), "committed pending deltas");
                Ok(CommitReport {
                    batch_id,
                    committed: deltas,
                })
            }
            Err(err) => {
                error!(%batch_id, error = %err, "commit failed; pending deltas kept");
                Err(CommitError::CommitFailed(err))
            }
        }
    }

    fn write(
        &self,
        ledger: &mut AdjustmentLedger,
        deltas: &[PendingDelta],
    ) -> Result<(), StoreError> {
        self.recorder.flush(ledger.audit_mut())?;

        let store = self.recorder.store();
        for d in deltas {
            if store.find_item(&d.item_id)?.is_none() {
                return Err(StoreError::NotFound(d.item_id.clone()));
            }
        }

        store.apply_deltas(deltas)
    }
}
