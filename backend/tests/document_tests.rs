//! Document lifecycle and numbering tests
//!
//! Tests for:
//! - Draft / confirmed / cancelled transitions
//! - Human-readable document numbers and their per-day sequences
//! - Actor department scoping for write-offs

use chrono::NaiveDate;
use proptest::prelude::*;
use uuid::Uuid;

use mbo_backend::services::numbering::{
    format_number, next_sequence, parse_sequence, NumberSeries,
};
use mbo_backend::services::{ActorContext, DepartmentScope};
use shared::models::{CountStatus, DocumentStatus};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn only_draft_documents_are_editable() {
        assert!(DocumentStatus::Draft.is_draft());
        assert!(!DocumentStatus::Confirmed.is_draft());
        assert!(!DocumentStatus::Cancelled.is_draft());
    }

    #[test]
    fn confirmed_and_cancelled_are_terminal() {
        assert!(!DocumentStatus::Draft.is_terminal());
        assert!(DocumentStatus::Confirmed.is_terminal());
        assert!(DocumentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn document_status_round_trips_through_storage_form() {
        for s in [
            DocumentStatus::Draft,
            DocumentStatus::Confirmed,
            DocumentStatus::Cancelled,
        ] {
            assert_eq!(DocumentStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(DocumentStatus::from_str("pending"), None);
    }

    #[test]
    fn count_status_has_two_states() {
        assert!(CountStatus::InProgress.is_in_progress());
        assert!(!CountStatus::Approved.is_in_progress());
        assert_eq!(CountStatus::from_str("in_progress"), Some(CountStatus::InProgress));
        assert_eq!(CountStatus::from_str("approved"), Some(CountStatus::Approved));
    }

    #[test]
    fn document_numbers_use_series_prefix_and_day() {
        assert_eq!(
            format_number(NumberSeries::Purchase, day(2025, 3, 7), 1),
            "PUR-20250307-001"
        );
        assert_eq!(
            format_number(NumberSeries::Transfer, day(2025, 3, 7), 12),
            "TRF-20250307-012"
        );
        assert_eq!(
            format_number(NumberSeries::WriteOff, day(2025, 3, 7), 7),
            "WRT-20250307-007"
        );
        assert_eq!(
            format_number(NumberSeries::InventoryCount, day(2025, 3, 7), 120),
            "INV-20250307-120"
        );
    }

    #[test]
    fn sequence_restarts_each_day_from_one() {
        // A fresh day has no persisted number, so the sequence starts over
        assert_eq!(next_sequence(None), 1);
        assert_eq!(next_sequence(Some("PUR-20250306-041")), 42);
    }

    #[test]
    fn unrestricted_actor_may_write_off_anywhere() {
        let actor = ActorContext::unrestricted(Uuid::new_v4());
        assert!(actor.writeoff_scope.allows(Uuid::new_v4()));
        assert!(actor.writeoff_scope.allows(Uuid::new_v4()));
    }

    #[test]
    fn scoped_actor_is_rejected_outside_own_department() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let actor = ActorContext::scoped_to(Uuid::new_v4(), own);

        assert!(actor.writeoff_scope.allows(own));
        assert!(!actor.writeoff_scope.allows(other));
        assert_eq!(actor.writeoff_scope, DepartmentScope::Only(own));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn series_strategy() -> impl Strategy<Value = NumberSeries> {
        prop_oneof![
            Just(NumberSeries::Purchase),
            Just(NumberSeries::Transfer),
            Just(NumberSeries::WriteOff),
            Just(NumberSeries::InventoryCount),
        ]
    }

    fn date_strategy() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2030, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    proptest! {
        /// Every formatted number parses back to its own sequence
        #[test]
        fn formatted_sequence_parses_back(
            series in series_strategy(),
            date in date_strategy(),
            sequence in 1u32..100_000,
        ) {
            let number = format_number(series, date, sequence);
            prop_assert_eq!(parse_sequence(&number), Some(sequence));
        }

        /// The next sequence is always exactly one past the last number
        #[test]
        fn sequence_increments_by_one(
            series in series_strategy(),
            date in date_strategy(),
            sequence in 1u32..100_000,
        ) {
            let last = format_number(series, date, sequence);
            prop_assert_eq!(next_sequence(Some(&last)), sequence + 1);
        }

        /// Numbers from different series never collide on the same day
        #[test]
        fn series_never_collide(
            date in date_strategy(),
            sequence in 1u32..1000,
        ) {
            let all = [
                format_number(NumberSeries::Purchase, date, sequence),
                format_number(NumberSeries::Transfer, date, sequence),
                format_number(NumberSeries::WriteOff, date, sequence),
                format_number(NumberSeries::InventoryCount, date, sequence),
            ];
            for (i, a) in all.iter().enumerate() {
                for b in all.iter().skip(i + 1) {
                    prop_assert_ne!(a, b);
                }
            }
        }
    }
}
