//! Inventory count reconciliation tests
//!
//! Tests for:
//! - The counting tolerance that filters floating-point noise
//! - Surplus / shortage adjustment direction
//! - Absolute position semantics of count approval

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use mbo_backend::services::inventory_count::{CountApproval, CountDetail};
use shared::models::{CountStatus, InventoryCount, InventoryCountItem};
use shared::validation::{
    adjustment_direction, count_tolerance, is_negligible_difference, AdjustmentDirection,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn count_item(system: Decimal) -> InventoryCountItem {
    InventoryCountItem {
        id: Uuid::new_v4(),
        inventory_count_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        system_quantity: system,
        actual_quantity: system,
        difference: Decimal::ZERO,
        notes: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn tolerance_is_one_thousandth() {
        assert_eq!(count_tolerance(), dec("0.001"));
    }

    #[test]
    fn differences_below_tolerance_are_skipped() {
        assert!(is_negligible_difference(dec("0.0004")));
        assert!(is_negligible_difference(dec("-0.0009")));
        assert!(is_negligible_difference(Decimal::ZERO));
    }

    #[test]
    fn difference_at_tolerance_is_adjusted() {
        // Exactly 0.001 is a real discrepancy, not noise
        assert!(!is_negligible_difference(dec("0.001")));
        assert!(!is_negligible_difference(dec("-0.001")));
        assert_eq!(
            adjustment_direction(dec("0.001")),
            Some(AdjustmentDirection::Surplus)
        );
    }

    #[test]
    fn counted_more_than_recorded_is_surplus() {
        assert_eq!(
            adjustment_direction(dec("2.5")),
            Some(AdjustmentDirection::Surplus)
        );
    }

    #[test]
    fn counted_less_than_recorded_is_shortage() {
        assert_eq!(
            adjustment_direction(dec("-1.75")),
            Some(AdjustmentDirection::Shortage)
        );
    }

    #[test]
    fn untouched_item_has_zero_difference() {
        // Snapshot seeds actual = system, so an uncounted item reconciles
        // to no adjustment
        let item = count_item(dec("8.000"));
        assert_eq!(item.difference, Decimal::ZERO);
        assert_eq!(adjustment_direction(item.difference), None);
    }

    #[test]
    fn recording_actual_recomputes_difference() {
        let mut item = count_item(dec("10.000"));
        item.set_actual_quantity(dec("7.500"));
        assert_eq!(item.difference, dec("-2.500"));

        item.set_actual_quantity(dec("11.000"));
        assert_eq!(item.difference, dec("1.000"));
    }

    #[test]
    fn approval_reports_number_of_adjusted_positions() {
        // Two real discrepancies and one within-tolerance item: the
        // approval outcome counts only the adjusted positions
        let mut surplus = count_item(dec("10.000"));
        surplus.set_actual_quantity(dec("12.000"));
        let mut shortage = count_item(dec("5.000"));
        shortage.set_actual_quantity(dec("4.500"));
        let mut noise = count_item(dec("8.000"));
        noise.set_actual_quantity(dec("8.0004"));

        let items = vec![surplus, shortage, noise];
        let adjusted_count = items
            .iter()
            .filter(|i| adjustment_direction(i.difference).is_some())
            .count();

        let approval = CountApproval {
            detail: CountDetail {
                count: InventoryCount {
                    id: Uuid::new_v4(),
                    number: "INV-20250307-001".to_string(),
                    date: chrono::NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
                    department_id: Uuid::new_v4(),
                    status: CountStatus::Approved,
                    created_by: None,
                    approved_by: Some(Uuid::new_v4()),
                    notes: None,
                    created_at: Utc::now(),
                    updated_at: None,
                },
                items,
            },
            adjusted_count,
        };

        assert_eq!(approval.adjusted_count, 2);

        // The document fields flatten next to the count in the payload
        let json = serde_json::to_value(&approval).unwrap();
        assert_eq!(json["adjusted_count"], 2);
        assert_eq!(json["number"], "INV-20250307-001");
        assert_eq!(json["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn approval_sets_position_to_counted_quantity() {
        // Approval is absolute: the position becomes the counted value even
        // if stock moved after the snapshot was taken
        let mut item = count_item(dec("10.000"));
        item.set_actual_quantity(dec("6.000"));

        let position_after_snapshot = dec("9.000"); // moved since the count started
        let _ = position_after_snapshot;
        let position_after_approval = item.actual_quantity;
        assert_eq!(position_after_approval, dec("6.000"));

        // The adjustment movement records the counted delta, unsigned
        assert_eq!(item.difference.abs(), dec("4.000"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 3))
    }

    proptest! {
        /// Difference is always actual minus system
        #[test]
        fn difference_is_actual_minus_system(
            system in quantity_strategy(),
            actual in quantity_strategy(),
        ) {
            let mut item = count_item(system);
            item.set_actual_quantity(actual);
            prop_assert_eq!(item.difference, actual - system);
        }

        /// A difference is either negligible or has a direction, never both
        #[test]
        fn tolerance_and_direction_are_complementary(
            system in quantity_strategy(),
            actual in quantity_strategy(),
        ) {
            let difference = actual - system;
            match adjustment_direction(difference) {
                None => prop_assert!(is_negligible_difference(difference)),
                Some(AdjustmentDirection::Surplus) => {
                    prop_assert!(difference >= count_tolerance());
                }
                Some(AdjustmentDirection::Shortage) => {
                    prop_assert!(difference <= -count_tolerance());
                }
            }
        }

        /// Applying the adjustment delta to the system quantity always lands
        /// on the counted quantity
        #[test]
        fn adjustment_reconciles_to_actual(
            system in quantity_strategy(),
            actual in quantity_strategy(),
        ) {
            let mut item = count_item(system);
            item.set_actual_quantity(actual);

            let reconciled = match adjustment_direction(item.difference) {
                Some(AdjustmentDirection::Surplus) => system + item.difference.abs(),
                Some(AdjustmentDirection::Shortage) => system - item.difference.abs(),
                None => system,
            };

            // Within tolerance the position is left as recorded
            let drift = (reconciled - actual).abs();
            prop_assert!(drift < count_tolerance());
        }
    }
}
