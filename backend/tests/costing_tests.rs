//! Average-cost valuation tests
//!
//! The valuation rule is a plain arithmetic mean over recorded inbound unit
//! costs, not a quantity-weighted average. These tests pin that behavior
//! down so the formula cannot drift silently.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::validation::arithmetic_mean_cost;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn mean_of_no_costs_is_zero() {
        assert_eq!(arithmetic_mean_cost(&[]), Decimal::ZERO);
    }

    #[test]
    fn mean_of_single_cost_is_that_cost() {
        assert_eq!(arithmetic_mean_cost(&[dec("12.50")]), dec("12.50"));
    }

    #[test]
    fn mean_ignores_quantities_entirely() {
        // 100 units at 5.00 and 1 unit at 15.00 still average to 10.00:
        // the formula sees two recorded costs, nothing else
        let costs = [dec("5.00"), dec("15.00")];
        assert_eq!(arithmetic_mean_cost(&costs), dec("10.00"));
    }

    #[test]
    fn repeated_purchases_at_same_price_keep_the_price() {
        let costs = [dec("7.25"); 5];
        assert_eq!(arithmetic_mean_cost(&costs), dec("7.25"));
    }

    #[test]
    fn transfer_item_cost_is_quantity_times_average() {
        let avg = arithmetic_mean_cost(&[dec("4.00"), dec("6.00")]);
        let quantity = dec("3.5");
        assert_eq!(avg * quantity, dec("17.50"));
    }

    #[test]
    fn valuation_of_unseen_product_is_zero() {
        // A department that never received the product values it at zero
        let avg = arithmetic_mean_cost(&[]);
        let quantity = dec("10");
        assert_eq!(avg * quantity, Decimal::ZERO);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn cost_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        /// The mean always lies between the smallest and largest cost
        #[test]
        fn mean_is_bounded_by_extremes(costs in prop::collection::vec(cost_strategy(), 1..30)) {
            let mean = arithmetic_mean_cost(&costs);
            let min = costs.iter().min().copied().unwrap();
            let max = costs.iter().max().copied().unwrap();
            prop_assert!(mean >= min);
            prop_assert!(mean <= max);
        }

        /// Reordering recorded costs never changes the valuation
        #[test]
        fn mean_is_order_independent(costs in prop::collection::vec(cost_strategy(), 1..30)) {
            let mean = arithmetic_mean_cost(&costs);
            let mut reversed = costs.clone();
            reversed.reverse();
            prop_assert_eq!(arithmetic_mean_cost(&reversed), mean);
        }

        /// Recorded costs are never negative, so no valuation is either
        #[test]
        fn mean_is_non_negative(costs in prop::collection::vec(cost_strategy(), 0..30)) {
            prop_assert!(arithmetic_mean_cost(&costs) >= Decimal::ZERO);
        }

        /// Appending another record at the current mean leaves it unchanged
        #[test]
        fn mean_is_fixed_point_under_own_value(costs in prop::collection::vec(cost_strategy(), 1..20)) {
            let mean = arithmetic_mean_cost(&costs);
            let mut extended = costs.clone();
            extended.push(mean);
            let new_mean = arithmetic_mean_cost(&extended);
            // Equal up to division rounding in Decimal
            let drift = (new_mean - mean).abs();
            prop_assert!(drift < dec("0.0000001"));
        }
    }
}
