//! Period aggregation over canonical tables.
//!
//! # Responsibility
//! - Sum amounts over an inclusive date range.
//! - Report the covered date span and the distinct dates of a table.
//!
//! # Invariants
//! - Rows without a date never contribute, whatever the range.
//! - Bounds are not reordered: `from > to` sums to `0`.

use crate::model::table::{CanonicalTable, PeriodSum};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("table has no row with a valid date")]
    EmptyRange,
}

/// Sums `amount` over rows with `date_from <= date <= date_to`.
pub fn sum_by_period(
    table: &CanonicalTable,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> PeriodSum {
    table
        .dated_rows()
        .filter(|(date, _)| date_from <= *date && *date <= date_to)
        .map(|(_, amount)| amount)
        .fold(0_i64, i64::saturating_add)
}

/// Returns `(min, max)` over all present dates.
pub fn min_max_date(table: &CanonicalTable) -> Result<(NaiveDate, NaiveDate), AggregateError> {
    table
        .dated_rows()
        .fold(None, |span: Option<(NaiveDate, NaiveDate)>, (date, _)| {
            Some(span.map_or((date, date), |(min, max)| (min.min(date), max.max(date))))
        })
        .ok_or(AggregateError::EmptyRange)
}

/// Returns present dates, deduplicated and ascending.
pub fn distinct_dates(table: &CanonicalTable) -> Vec<NaiveDate> {
    table
        .dated_rows()
        .map(|(date, _)| date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{distinct_dates, min_max_date, sum_by_period, AggregateError};
    use crate::model::table::{CanonicalTable, TableRow};
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> CanonicalTable {
        CanonicalTable::new(vec![
            TableRow::new(Some(ymd(2024, 1, 15)), 50),
            TableRow::new(Some(ymd(2024, 1, 1)), 100),
            TableRow::new(None, 999),
            TableRow::new(Some(ymd(2024, 2, 1)), 7),
            TableRow::new(Some(ymd(2024, 1, 1)), -20),
        ])
    }

    #[test]
    fn bounds_are_inclusive() {
        let table = sample();
        assert_eq!(sum_by_period(&table, ymd(2024, 1, 1), ymd(2024, 1, 31)), 130);
        assert_eq!(sum_by_period(&table, ymd(2024, 1, 15), ymd(2024, 2, 1)), 57);
        assert_eq!(sum_by_period(&table, ymd(2024, 2, 1), ymd(2024, 2, 1)), 7);
    }

    #[test]
    fn undated_rows_never_count() {
        let table = sample();
        assert_eq!(
            sum_by_period(&table, NaiveDate::MIN, NaiveDate::MAX),
            50 + 100 + 7 - 20
        );
    }

    #[test]
    fn reversed_range_sums_to_zero() {
        let table = sample();
        assert_eq!(sum_by_period(&table, ymd(2024, 1, 31), ymd(2024, 1, 1)), 0);
    }

    #[test]
    fn min_max_spans_present_dates() {
        assert_eq!(
            min_max_date(&sample()).unwrap(),
            (ymd(2024, 1, 1), ymd(2024, 2, 1))
        );
        let undated = CanonicalTable::new(vec![TableRow::new(None, 1)]);
        assert_eq!(min_max_date(&undated), Err(AggregateError::EmptyRange));
        assert_eq!(
            min_max_date(&CanonicalTable::empty()),
            Err(AggregateError::EmptyRange)
        );
    }

    #[test]
    fn distinct_dates_are_sorted_and_unique() {
        assert_eq!(
            distinct_dates(&sample()),
            vec![ymd(2024, 1, 1), ymd(2024, 1, 15), ymd(2024, 2, 1)]
        );
    }
}
