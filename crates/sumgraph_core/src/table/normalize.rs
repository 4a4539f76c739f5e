//! Raw grid to canonical table normalization.
//!
//! # Responsibility
//! - Decide the single garbage-row policy shared by every table source.
//! - Coerce column 0 into dates and column 1 into integer amounts.
//!
//! # Invariants
//! - The first grid row is the header and never becomes a table row.
//! - Unparseable dates become `None`; unparseable amounts become `0`.
//! - Grids narrower than two columns normalize to an empty table.
//! - Columns beyond the second are ignored.
//! - Pure: no I/O, deterministic for a given grid and pattern.

use crate::model::table::{CanonicalTable, TableRow};
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::{Display, Formatter};

/// Default date pattern: day.month.year.
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";

/// One untyped cell as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Already typed as a date by the source format.
    Date(NaiveDate),
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl From<String> for RawCell {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

/// Possibly ragged two-dimensional grid, header row first.
pub type RawGrid = Vec<Vec<RawCell>>;

/// Validated `strftime`-style date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat(String);

impl DateFormat {
    /// Validates `pattern`; returns `None` when it contains unknown specifiers.
    pub fn new(pattern: impl Into<String>) -> Option<Self> {
        let pattern = pattern.into();
        if pattern.trim().is_empty() {
            return None;
        }
        if StrftimeItems::new(pattern.as_str()).any(|item| matches!(item, Item::Error)) {
            return None;
        }
        Some(Self(pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses one textual cell; time components in the pattern are accepted and dropped.
    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(text, &self.0)
            .or_else(|_| NaiveDateTime::parse_from_str(text, &self.0).map(|dt| dt.date()))
            .ok()
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self(DEFAULT_DATE_FORMAT.to_string())
    }
}

impl Display for DateFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw grid (header row first) into a canonical table.
pub fn normalize(grid: &[Vec<RawCell>], date_format: &DateFormat) -> CanonicalTable {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if grid.is_empty() || width < 2 {
        return CanonicalTable::empty();
    }

    grid.iter()
        .skip(1)
        .map(|row| {
            TableRow::new(
                row.first().and_then(|cell| parse_date_cell(cell, date_format)),
                row.get(1).map_or(0, parse_amount_cell),
            )
        })
        .collect()
}

fn parse_date_cell(cell: &RawCell, date_format: &DateFormat) -> Option<NaiveDate> {
    match cell {
        RawCell::Date(date) => Some(*date),
        RawCell::Text(text) => date_format.parse(text),
        RawCell::Empty | RawCell::Number(_) | RawCell::Bool(_) => None,
    }
}

fn parse_amount_cell(cell: &RawCell) -> i64 {
    let value = match cell {
        RawCell::Number(value) => *value,
        RawCell::Text(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        RawCell::Bool(true) => 1.0,
        RawCell::Bool(false) | RawCell::Empty | RawCell::Date(_) => 0.0,
    };
    if value.is_finite() {
        // Truncates toward zero.
        value as i64
    } else {
        0
    }
}
