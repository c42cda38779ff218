//! UI-thread facade over the ledger, the store and the scan bridge.
//!
//! Everything that mutates inventory state goes through a [`Workbench`],
//! which lives on the UI thread. The scan thread only ever feeds it item ids
//! through [`Workbench::poll_scan`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use stockroom_core::{DomainError, Entity, ItemId};
use stockroom_infra::{CommitCoordinator, CommitError, CommitReport, InventoryStore, StoreError};
use stockroom_inventory::{
    AdjustmentLedger, Catalog, Direction, Item, UsagePeriod, UsagePoint, Validator, usage_series,
};

use crate::scan::{ScanBridge, ScanConfig, ScanError, ScanEvent, ScanHandle, ScanState};
use crate::session::Session;

/// Asks the operator a yes/no question.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F> Prompter for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("no scanner is configured")]
    ScannerNotConfigured,

    #[error("a scan is already running")]
    ScanInProgress,
}

/// Result of an Add/Remove the operator may have declined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The change was applied; carries the new quantity.
    Applied(f64),
    /// The operator declined the large-change confirmation.
    Declined,
}

/// What the UI shows for the selected item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionView {
    pub item_id: ItemId,
    pub label: String,
    pub original_quantity: f64,
    pub current_quantity: f64,
}

pub struct Workbench {
    session: Session,
    ledger: AdjustmentLedger,
    validator: Validator,
    store: Arc<dyn InventoryStore>,
    coordinator: CommitCoordinator<Arc<dyn InventoryStore>>,
    scanner: Option<(ScanBridge, ScanConfig)>,
    scan: Option<ScanHandle>,
    selected: Option<ItemId>,
}

impl Workbench {
    /// Load the catalog and start a working session for `session`'s operator.
    pub fn open(
        session: Session,
        store: Arc<dyn InventoryStore>,
        validator: Validator,
    ) -> Result<Self, WorkbenchError> {
        let records = store.load_catalog()?;
        let catalog = Catalog::from_items(records.into_iter().map(Item::from))?;
        info!(items = catalog.len(), operator = %session.operator(), "catalog loaded");

        Ok(Self {
            session,
            ledger: AdjustmentLedger::new(catalog),
            validator,
            coordinator: CommitCoordinator::new(Arc::clone(&store)),
            store,
            scanner: None,
            scan: None,
            selected: None,
        })
    }

    pub fn with_scanner(mut self, bridge: ScanBridge, config: ScanConfig) -> Self {
        self.scanner = Some((bridge, config));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ledger(&self) -> &AdjustmentLedger {
        &self.ledger
    }

    pub fn catalog(&self) -> &Catalog {
        self.ledger.catalog()
    }

    pub fn selected(&self) -> Option<&ItemId> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, item_id: &ItemId) -> Result<SelectionView, WorkbenchError> {
        let view = self.view(item_id)?;
        self.selected = Some(item_id.clone());
        Ok(view)
    }

    /// Current view of an item without changing the selection.
    pub fn view(&self, item_id: &ItemId) -> Result<SelectionView, WorkbenchError> {
        let catalog = self.ledger.catalog();
        let item = catalog
            .get(item_id)
            .ok_or_else(|| DomainError::item_not_found(item_id))?;
        Ok(SelectionView {
            item_id: item_id.clone(),
            label: item.label(),
            original_quantity: catalog.original_quantity(item_id)?,
            current_quantity: item.quantity(),
        })
    }

    pub fn search(&self, query: &str) -> Vec<&Item> {
        self.ledger.catalog().search(query)
    }

    pub fn add(
        &mut self,
        item_id: &ItemId,
        raw: &str,
        prompter: &mut dyn Prompter,
    ) -> Result<Outcome, WorkbenchError> {
        self.change(item_id, raw, Direction::Add, prompter)
    }

    pub fn remove(
        &mut self,
        item_id: &ItemId,
        raw: &str,
        prompter: &mut dyn Prompter,
    ) -> Result<Outcome, WorkbenchError> {
        self.change(item_id, raw, Direction::Remove, prompter)
    }

    fn change(
        &mut self,
        item_id: &ItemId,
        raw: &str,
        direction: Direction,
        prompter: &mut dyn Prompter,
    ) -> Result<Outcome, WorkbenchError> {
        let current = self.ledger.catalog().current_quantity(item_id)?;
        let change = self.validator.validate(raw, direction)?;
        self.validator.check_stock(item_id, current, &change)?;

        if change.requires_confirmation {
            let question = format!(
                "Are you sure you want to change the quantity by {}?",
                change.magnitude
            );
            if !prompter.confirm(&question) {
                info!(item_id = %item_id, magnitude = change.magnitude, "large change declined");
                return Ok(Outcome::Declined);
            }
        }

        let new_quantity = self.ledger.apply(
            item_id,
            change.signed_delta(),
            self.session.operator(),
            Utc::now(),
        )?;

        if let Err(err) = self.coordinator.recorder().flush(self.ledger.audit_mut()) {
            warn!(error = %err, "audit entry queued for retry");
        }

        Ok(Outcome::Applied(new_quantity))
    }

    /// Persist pending deltas after the operator confirms.
    ///
    /// Returns `None` when the operator declined. An empty ledger commits
    /// without asking.
    pub fn commit(
        &mut self,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<CommitReport>, WorkbenchError> {
        if !self.ledger.is_empty() && !prompter.confirm("Are you sure you want to save changes?")
        {
            return Ok(None);
        }
        Ok(Some(self.coordinator.commit(&mut self.ledger)?))
    }

    pub fn start_scan(&mut self) -> Result<(), WorkbenchError> {
        let Some((bridge, config)) = &self.scanner else {
            return Err(WorkbenchError::ScannerNotConfigured);
        };
        if self.scan.as_ref().is_some_and(|h| !h.is_stopped()) {
            return Err(WorkbenchError::ScanInProgress);
        }
        self.scan = Some(bridge.spawn(*config)?);
        Ok(())
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan
            .as_ref()
            .map(ScanHandle::state)
            .unwrap_or(ScanState::Idle)
    }

    /// Drain the scan handoff. A resolved item present in the catalog becomes
    /// the selection.
    pub fn poll_scan(&mut self) -> Vec<ScanEvent> {
        let Some(handle) = &self.scan else {
            return Vec::new();
        };
        let stopped = handle.is_stopped();
        let events = handle.drain();

        for event in &events {
            if let ScanEvent::Resolved(result) = event {
                match &result.item_id {
                    Some(item_id) if self.ledger.catalog().contains(item_id) => {
                        self.selected = Some(item_id.clone());
                    }
                    Some(item_id) => {
                        warn!(item_id = %item_id, "scanned item is not in the loaded catalog");
                    }
                    None => {}
                }
            }
        }

        // Events sent before the thread stopped are all drained by now.
        if stopped {
            self.scan = None;
        }
        events
    }

    pub fn stop_scan(&mut self) {
        if let Some(handle) = self.scan.take() {
            handle.stop();
        }
    }

    /// Rendered audit lines of this session, oldest first.
    pub fn recent_changes(&self) -> Vec<String> {
        self.ledger.audit().rendered_lines()
    }

    /// Change totals for one item from the persisted trail plus any entries
    /// still queued for write-through.
    pub fn usage_report(
        &self,
        item_id: &ItemId,
        period: UsagePeriod,
        month: Option<u32>,
    ) -> Result<Vec<UsagePoint>, WorkbenchError> {
        let mut entries = self.store.audit_history(item_id)?;
        entries.extend(self.ledger.audit().unpersisted().iter().cloned());
        Ok(usage_series(&entries, item_id, period, month))
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        self.stop_scan();
        if !self.ledger.is_empty() {
            warn!(
                pending = self.ledger.pending_deltas().len(),
                "closing with uncommitted changes"
            );
        }
    }
}
