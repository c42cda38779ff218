//! Fixed-scale stock quantities.
//!
//! Quantities stay `f64` at the API, but every value that is stored, shown
//! or compared is first rounded to [`QUANTITY_DECIMALS`] places. Sums of
//! on-scale values then land on the same double regardless of the order
//! they were added in, so `0.1 + 0.2 - 0.3` is exactly zero.

/// Decimal places kept for every quantity and delta.
pub const QUANTITY_DECIMALS: u32 = 3;

const SCALE: f64 = 1_000.0;

/// Round `value` to [`QUANTITY_DECIMALS`] places. Negative zero becomes zero.
pub fn normalize_quantity(value: f64) -> f64 {
    let rounded = (value * SCALE).round() / SCALE;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// `a + b`, rounded to the quantity scale.
pub fn add_quantities(a: f64, b: f64) -> f64 {
    normalize_quantity(a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_sums_cancel_exactly() {
        let up = add_quantities(add_quantities(1.0, 0.1), 0.2);
        assert_eq!(up, 1.3);
        assert_eq!(add_quantities(up, -0.3), 1.0);
        assert_eq!(add_quantities(add_quantities(0.1, 0.2), -0.3), 0.0);
    }

    #[test]
    fn rounds_to_three_places() {
        assert_eq!(normalize_quantity(2.34567), 2.346);
        assert_eq!(normalize_quantity(0.0004), 0.0);
        assert_eq!(normalize_quantity(-0.0).to_string(), "0");
        assert_eq!(normalize_quantity(0.19999999999999998), 0.2);
    }
}
