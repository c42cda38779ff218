use tracing::{debug, warn};

use stockroom_inventory::AuditLog;

use crate::store::{InventoryStore, StoreError};

/// Writes session audit entries through to the store.
///
/// Entries are written in order. A failed write stops the flush and leaves
/// that entry (and everything after it) queued in the [`AuditLog`], so the
/// next flush retries from the same point.
#[derive(Debug, Clone)]
pub struct AuditRecorder<S> {
    store: S,
}

impl<S: InventoryStore> AuditRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist every queued entry. Returns how many were written.
    pub fn flush(&self, log: &mut AuditLog) -> Result<usize, StoreError> {
        let queued = log.unpersisted().len();
        if queued == 0 {
            return Ok(0);
        }

        let mut written = 0;
        let outcome: Result<(), StoreError> = log.unpersisted().iter().try_for_each(|entry| {
            self.store.append_audit(entry)?;
            written += 1;
            Ok(())
        });
        log.mark_persisted(written);

        match outcome {
            Ok(()) => {
                debug!(written, "audit entries persisted");
                Ok(written)
            }
            Err(err) => {
                warn!(
                    written,
                    still_queued = queued - written,
                    error = %err,
                    "audit write-through failed; entries stay queued"
                );
                Err(err)
            }
        }
    }
}
