//! Validation and reconciliation helpers for the Materials Back Office
//!
//! Pure functions shared between the engine and its tests.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Tolerance for count reconciliation: differences smaller than 0.001 units
/// are treated as floating-point noise and skipped.
pub fn count_tolerance() -> Decimal {
    Decimal::new(1, 3)
}

/// Whether a counted difference is too small to adjust
pub fn is_negligible_difference(difference: Decimal) -> bool {
    difference.abs() < count_tolerance()
}

/// Direction of a count adjustment movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentDirection {
    /// Counted more than recorded: inbound (`to`-only) movement
    Surplus,
    /// Counted less than recorded: outbound (`from`-only) movement
    Shortage,
}

/// Translate a count difference into a directional adjustment, or `None`
/// when the difference is within tolerance.
pub fn adjustment_direction(difference: Decimal) -> Option<AdjustmentDirection> {
    if is_negligible_difference(difference) {
        None
    } else if difference > Decimal::ZERO {
        Some(AdjustmentDirection::Surplus)
    } else {
        Some(AdjustmentDirection::Shortage)
    }
}

/// Validate a document item quantity is strictly positive
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a unit price is not negative
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Transfers must move goods between two different departments
pub fn validate_distinct_departments(from: Uuid, to: Uuid) -> Result<(), &'static str> {
    if from == to {
        return Err("Cannot transfer to the same department");
    }
    Ok(())
}

/// Write-off reason must not be blank
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("Reason cannot be empty");
    }
    Ok(())
}

/// Plain arithmetic mean of recorded unit costs, zero when empty.
///
/// Deliberately not quantity-weighted: the historical valuation rule of the
/// system averages recorded inbound unit costs as-is, and changing the
/// formula would alter financial figures.
pub fn arithmetic_mean_cost(costs: &[Decimal]) -> Decimal {
    if costs.is_empty() {
        return Decimal::ZERO;
    }
    let total: Decimal = costs.iter().sum();
    total / Decimal::from(costs.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn tolerance_skips_noise() {
        assert!(is_negligible_difference(dec("0.0004")));
        assert!(is_negligible_difference(dec("-0.0009")));
        assert!(!is_negligible_difference(dec("0.001")));
        assert!(!is_negligible_difference(dec("-3")));
    }

    #[test]
    fn adjustment_direction_follows_sign() {
        assert_eq!(
            adjustment_direction(dec("3")),
            Some(AdjustmentDirection::Surplus)
        );
        assert_eq!(
            adjustment_direction(dec("-3")),
            Some(AdjustmentDirection::Shortage)
        );
        assert_eq!(adjustment_direction(dec("0.0002")), None);
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(validate_quantity(dec("0.001")).is_ok());
        assert!(validate_quantity(Decimal::ZERO).is_err());
        assert!(validate_quantity(dec("-1")).is_err());
    }

    #[test]
    fn same_department_transfer_rejected() {
        let dept = Uuid::new_v4();
        assert!(validate_distinct_departments(dept, dept).is_err());
        assert!(validate_distinct_departments(dept, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn mean_cost_is_plain_average() {
        // 5.00 and 7.00 average to 6.00 regardless of quantities involved
        assert_eq!(
            arithmetic_mean_cost(&[dec("5.00"), dec("7.00")]),
            dec("6.00")
        );
        assert_eq!(arithmetic_mean_cost(&[]), Decimal::ZERO);
    }
}
