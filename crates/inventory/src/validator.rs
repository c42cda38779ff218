//! Checks on proposed quantity changes.
//!
//! Validation is split in two: [`Validator::validate`] is stateless and looks
//! only at the raw input, [`Validator::check_stock`] needs the live quantity
//! of the target item.

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ItemId, add_quantities, normalize_quantity};

/// Magnitude at or above which an operator must confirm the change.
pub const DEFAULT_LARGE_CHANGE_THRESHOLD: f64 = 100.0;

/// Which way the operator wants to move the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Add,
    Remove,
}

impl Direction {
    pub fn symbol(self) -> char {
        match self {
            Direction::Add => '+',
            Direction::Remove => '-',
        }
    }
}

/// A validated, not yet applied, quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub direction: Direction,
    /// Always finite and `>= 0`.
    pub magnitude: f64,
    pub requires_confirmation: bool,
}

impl QuantityChange {
    pub fn signed_delta(&self) -> f64 {
        match self.direction {
            Direction::Add => self.magnitude,
            Direction::Remove => -self.magnitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validator {
    large_change_threshold: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_CHANGE_THRESHOLD)
    }
}

impl Validator {
    pub fn new(large_change_threshold: f64) -> Self {
        Self {
            large_change_threshold,
        }
    }

    pub fn large_change_threshold(&self) -> f64 {
        self.large_change_threshold
    }

    /// Parse the raw text typed by the operator into a magnitude.
    ///
    /// Surrounding whitespace is ignored. `inf` and `NaN` are rejected as
    /// `NotANumber` even though they parse, since neither is a count. The
    /// result is rounded to the quantity scale.
    pub fn parse_magnitude(raw: &str) -> DomainResult<f64> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| DomainError::not_a_number(raw))?;
        if !value.is_finite() {
            return Err(DomainError::not_a_number(raw));
        }
        if value < 0.0 {
            return Err(DomainError::NegativeMagnitude(value));
        }
        Ok(normalize_quantity(value))
    }

    /// Stateless check of a raw input for the given direction.
    pub fn validate(&self, raw: &str, direction: Direction) -> DomainResult<QuantityChange> {
        let magnitude = Self::parse_magnitude(raw)?;
        Ok(QuantityChange {
            direction,
            magnitude,
            requires_confirmation: magnitude >= self.large_change_threshold,
        })
    }

    /// Stateful check against the live quantity of `item_id`.
    pub fn check_stock(
        &self,
        item_id: &ItemId,
        current: f64,
        change: &QuantityChange,
    ) -> DomainResult<()> {
        if add_quantities(current, change.signed_delta()) < 0.0 {
            return Err(DomainError::InsufficientStock {
                item_id: item_id.clone(),
                available: current,
                requested: change.magnitude,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ItemId {
        ItemId::new("A1").unwrap()
    }

    #[test]
    fn parses_plain_and_padded_numbers() {
        assert_eq!(Validator::parse_magnitude("5").unwrap(), 5.0);
        assert_eq!(Validator::parse_magnitude(" 2.5 ").unwrap(), 2.5);
        assert_eq!(Validator::parse_magnitude("1e2").unwrap(), 100.0);
        assert_eq!(Validator::parse_magnitude("-0").unwrap().to_string(), "0");
        assert_eq!(Validator::parse_magnitude("0.12345").unwrap(), 0.123);
    }

    #[test]
    fn rejects_non_numbers() {
        for raw in ["", "abc", "5 units", "inf", "NaN", "1,5"] {
            assert!(
                matches!(Validator::parse_magnitude(raw), Err(DomainError::NotANumber(_))),
                "{raw:?} should be NotANumber"
            );
        }
    }

    #[test]
    fn rejects_negative_magnitude() {
        assert_eq!(
            Validator::parse_magnitude("-3"),
            Err(DomainError::NegativeMagnitude(-3.0))
        );
    }

    #[test]
    fn large_changes_need_confirmation() {
        let v = Validator::default();
        assert!(!v.validate("99.5", Direction::Add).unwrap().requires_confirmation);
        assert!(v.validate("100", Direction::Add).unwrap().requires_confirmation);
        assert!(v.validate("150", Direction::Remove).unwrap().requires_confirmation);

        let strict = Validator::new(10.0);
        assert!(strict.validate("10", Direction::Add).unwrap().requires_confirmation);
    }

    #[test]
    fn stock_check_blocks_overdraw_only() {
        let v = Validator::default();
        let remove_50 = v.validate("50", Direction::Remove).unwrap();
        let remove_10 = v.validate("10", Direction::Remove).unwrap();
        let add_50 = v.validate("50", Direction::Add).unwrap();

        assert_eq!(
            v.check_stock(&id(), 10.0, &remove_50),
            Err(DomainError::InsufficientStock {
                item_id: id(),
                available: 10.0,
                requested: 50.0,
            })
        );
        assert!(v.check_stock(&id(), 10.0, &remove_10).is_ok());
        assert!(v.check_stock(&id(), 0.0, &add_50).is_ok());
    }

    #[test]
    fn fractional_stock_can_be_emptied() {
        let v = Validator::default();
        let remove_tenth = v.validate("0.1", Direction::Remove).unwrap();
        let remove_fifth = v.validate("0.2", Direction::Remove).unwrap();

        let left = add_quantities(0.3, remove_tenth.signed_delta());
        assert_eq!(left, 0.2);
        assert!(v.check_stock(&id(), left, &remove_fifth).is_ok());
        assert!(v.check_stock(&id(), 0.19999999999999998, &remove_fifth).is_ok());
    }
}
