//! Inventory adjustment domain.
//!
//! This crate contains the rules for staging quantity changes against the
//! loaded catalog, implemented purely as deterministic domain logic (no IO,
//! no UI, no storage). Timestamps and actors are passed in by the caller.

pub mod audit;
pub mod catalog;
pub mod ledger;
pub mod usage;
pub mod validator;

pub use audit::{AuditEntry, AuditLog};
pub use catalog::{Catalog, Item};
pub use ledger::{AdjustmentLedger, PendingDelta};
pub use usage::{UsagePeriod, UsagePoint, usage_series};
pub use validator::{DEFAULT_LARGE_CHANGE_THRESHOLD, Direction, QuantityChange, Validator};
