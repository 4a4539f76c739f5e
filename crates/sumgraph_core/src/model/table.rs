//! Canonical `(date, amount)` table.
//!
//! # Responsibility
//! - Hold one normalized load of a two-column source.
//!
//! # Invariants
//! - Row order is source order; rows are not sorted by date.
//! - `amount` is never absent; unparseable cells were coerced to `0`.
//! - The table is immutable after construction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregate of `amount` over an inclusive date range.
pub type PeriodSum = i64;

/// One normalized row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// `None` when the source cell was missing or did not match the date pattern.
    pub date: Option<NaiveDate>,
    pub amount: i64,
}

impl TableRow {
    pub fn new(date: Option<NaiveDate>, amount: i64) -> Self {
        Self { date, amount }
    }
}

/// Normalized table shared by all downstream computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTable {
    rows: Vec<TableRow>,
}

impl CanonicalTable {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    /// Returns an empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates rows that carry a present date.
    pub fn dated_rows(&self) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.rows
            .iter()
            .filter_map(|row| row.date.map(|date| (date, row.amount)))
    }
}

impl FromIterator<TableRow> for CanonicalTable {
    fn from_iter<I: IntoIterator<Item = TableRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{CanonicalTable, TableRow};
    use chrono::NaiveDate;

    #[test]
    fn dated_rows_skips_absent_dates() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let table: CanonicalTable = [TableRow::new(Some(day), 5), TableRow::new(None, 7)]
            .into_iter()
            .collect();

        let dated: Vec<_> = table.dated_rows().collect();
        assert_eq!(table.len(), 2);
        assert_eq!(dated, vec![(day, 5)]);
    }
}
