//! Audit trail of realized quantity changes.
//!
//! One [`AuditEntry`] is recorded per applied Add/Remove, independent of when
//! (or whether) the ledger is committed. The [`AuditLog`] also tracks which
//! entries have reached persistent storage so failed write-throughs can be
//! retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::{ItemId, OperatorId};

/// Immutable record of one applied change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub item_id: ItemId,
    pub item_name: String,
    pub original_quantity: f64,
    pub new_quantity: f64,
    pub delta: f64,
    pub actor: OperatorId,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Feed line: `"{id} - {name}: {original} {+|-} {magnitude} = {new}"`.
    pub fn render(&self) -> String {
        let op = if self.delta < 0.0 { '-' } else { '+' };
        format!(
            "{} - {}: {} {} {} = {}",
            self.item_id,
            self.item_name,
            self.original_quantity,
            op,
            self.delta.abs(),
            self.new_quantity
        )
    }
}

/// Append-only session log of audit entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    /// Entries before this index are known to be persisted.
    persisted: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries of the session, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries not yet written to the store, oldest first.
    pub fn unpersisted(&self) -> &[AuditEntry] {
        &self.entries[self.persisted..]
    }

    /// Mark the next `count` unpersisted entries as written.
    pub fn mark_persisted(&mut self, count: usize) {
        self.persisted = (self.persisted + count).min(self.entries.len());
    }

    /// The "recent changes" feed, oldest first.
    pub fn rendered_lines(&self) -> Vec<String> {
        self.entries.iter().map(AuditEntry::render).collect()
    }
}
