//! Human-readable document number generation
//!
//! Numbers follow `<PREFIX>-<YYYYMMDD>-<NNN>` with a per-prefix, per-day
//! sequence. The sequence is derived from the latest persisted number, but
//! the unique index on `number` is the real authority: creation retries on a
//! unique-constraint collision rather than trusting count-then-format to be
//! race-free.

use chrono::{NaiveDate, Utc};
use sqlx::{Postgres, Transaction};

use crate::error::AppResult;

/// How many times document creation retries a colliding number before
/// surfacing a concurrency conflict
pub const MAX_NUMBER_ATTEMPTS: u32 = 3;

/// One number series per document type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberSeries {
    Purchase,
    Transfer,
    WriteOff,
    InventoryCount,
}

impl NumberSeries {
    pub fn prefix(&self) -> &'static str {
        match self {
            NumberSeries::Purchase => "PUR",
            NumberSeries::Transfer => "TRF",
            NumberSeries::WriteOff => "WRT",
            NumberSeries::InventoryCount => "INV",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            NumberSeries::Purchase => "purchases",
            NumberSeries::Transfer => "transfers",
            NumberSeries::WriteOff => "writeoffs",
            NumberSeries::InventoryCount => "inventory_counts",
        }
    }
}

/// Format a document number for a given day and sequence
pub fn format_number(series: NumberSeries, date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}-{}-{:03}",
        series.prefix(),
        date.format("%Y%m%d"),
        sequence
    )
}

/// Parse the trailing sequence out of an existing number
pub fn parse_sequence(number: &str) -> Option<u32> {
    number.rsplit('-').next()?.parse().ok()
}

/// Next sequence after the latest persisted number, starting at 1
pub fn next_sequence(last_number: Option<&str>) -> u32 {
    last_number
        .and_then(parse_sequence)
        .map(|n| n + 1)
        .unwrap_or(1)
}

/// Generate the next number in a series for today
pub async fn next_document_number(
    tx: &mut Transaction<'_, Postgres>,
    series: NumberSeries,
) -> AppResult<String> {
    let today = Utc::now().date_naive();
    let day_prefix = format!("{}-{}", series.prefix(), today.format("%Y%m%d"));

    let sql = format!(
        "SELECT number FROM {} WHERE number LIKE $1 ORDER BY number DESC LIMIT 1",
        series.table()
    );
    let last: Option<String> = sqlx::query_scalar(&sql)
        .bind(format!("{}-%", day_prefix))
        .fetch_optional(&mut **tx)
        .await?;

    Ok(format_number(series, today, next_sequence(last.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn number_format_is_zero_padded() {
        assert_eq!(
            format_number(NumberSeries::Purchase, day(2025, 3, 7), 1),
            "PUR-20250307-001"
        );
        assert_eq!(
            format_number(NumberSeries::InventoryCount, day(2025, 12, 31), 42),
            "INV-20251231-042"
        );
    }

    #[test]
    fn sequence_parses_back() {
        assert_eq!(parse_sequence("TRF-20250307-009"), Some(9));
        assert_eq!(parse_sequence("WRT-20250307-123"), Some(123));
        assert_eq!(parse_sequence("garbage"), None);
    }

    #[test]
    fn sequence_starts_at_one_and_increments() {
        assert_eq!(next_sequence(None), 1);
        assert_eq!(next_sequence(Some("PUR-20250307-001")), 2);
        assert_eq!(next_sequence(Some("PUR-20250307-099")), 100);
    }

    #[test]
    fn each_series_has_distinct_prefix() {
        let prefixes = [
            NumberSeries::Purchase.prefix(),
            NumberSeries::Transfer.prefix(),
            NumberSeries::WriteOff.prefix(),
            NumberSeries::InventoryCount.prefix(),
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
