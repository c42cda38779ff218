//! Domain error model.

use thiserror::Error;

use crate::id::ItemId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of stock adjustments
/// (validation, lookups, invariants). Storage and scanning failures have
/// their own error types in the crates that own those concerns.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// The raw quantity input did not parse as a finite real number.
    #[error("not a number: {0:?}")]
    NotANumber(String),

    /// The parsed magnitude was below zero; direction is chosen separately.
    #[error("quantity must not be negative (got {0})")]
    NegativeMagnitude(f64),

    /// Applying the change would take the item below zero.
    #[error("insufficient stock for {item_id}: have {available}, asked to remove {requested}")]
    InsufficientStock {
        item_id: ItemId,
        available: f64,
        requested: f64,
    },

    /// The item is not present in the loaded catalog.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// A delta reached the ledger that would leave negative stock.
    ///
    /// The validator's stock check runs first, so this is a defect rather
    /// than an operator error.
    #[error("invariant violated: {item_id} would become {result}")]
    NegativeResult { item_id: ItemId, result: f64 },

    /// An identifier was invalid (e.g. empty).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_a_number(raw: impl Into<String>) -> Self {
        Self::NotANumber(raw.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn item_not_found(item_id: &ItemId) -> Self {
        Self::ItemNotFound(item_id.clone())
    }

    /// Errors the operator can fix by changing the input or selection.
    pub fn is_user_correctable(&self) -> bool {
        !self.is_defect()
    }

    /// Internal invariant breaches.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::NegativeResult { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let id = ItemId::new("A1").unwrap();
        assert!(DomainError::not_a_number("abc").is_user_correctable());
        assert!(DomainError::item_not_found(&id).is_user_correctable());
        let breach = DomainError::NegativeResult {
            item_id: id,
            result: -1.0,
        };
        assert!(breach.is_defect());
        assert!(!breach.is_user_correctable());
    }
}
