//! Local workbook reader.
//!
//! # Responsibility
//! - Open a local spreadsheet file and extract its first worksheet as a raw grid.
//!
//! # Invariants
//! - Missing or unreadable paths fail with `FileAccess`, unparseable files with `Format`.
//! - Typed date cells bypass the text date pattern.

use super::normalize::{normalize, DateFormat, RawCell, RawGrid};
use super::{SourceError, SourceResult, TableSource};
use crate::model::table::CanonicalTable;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;

/// Reads `.xlsx`, `.xlsm`, `.xls` and `.ods` files.
#[derive(Debug, Clone)]
pub struct WorkbookReader {
    path: PathBuf,
    date_format: DateFormat,
}

impl WorkbookReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            date_format: DateFormat::default(),
        }
    }

    /// Overrides the pattern used for text date cells.
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    fn read_grid(&self) -> SourceResult<RawGrid> {
        if !self.path.is_file() {
            return Err(SourceError::FileAccess {
                path: self.path.display().to_string(),
                message: "file not found".to_string(),
            });
        }

        let mut workbook = open_workbook_auto(&self.path).map_err(|err| self.map_error(err))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SourceError::Format("workbook contains no worksheet".to_string()))?
            .map_err(|err| self.map_error(err))?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(raw_cell).collect())
            .collect())
    }

    fn map_error(&self, err: calamine::Error) -> SourceError {
        match err {
            calamine::Error::Io(io) => SourceError::FileAccess {
                path: self.path.display().to_string(),
                message: io.to_string(),
            },
            other => SourceError::Format(other.to_string()),
        }
    }
}

impl TableSource for WorkbookReader {
    fn read(&self) -> SourceResult<CanonicalTable> {
        let started_at = Instant::now();
        match self.read_grid() {
            Ok(grid) => {
                let table = normalize(&grid, &self.date_format);
                info!(
                    "event=table_read module=table source=workbook status=ok rows={} duration_ms={}",
                    table.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(table)
            }
            Err(err) => {
                error!(
                    "event=table_read module=table source=workbook status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn describe(&self) -> String {
        let name = self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        format!("Workbook ({name})")
    }
}

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(text) => RawCell::from(text.as_str()),
        Data::Float(value) => RawCell::Number(*value),
        Data::Int(value) => RawCell::Number(*value as f64),
        Data::Bool(value) => RawCell::Bool(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map_or(RawCell::Empty, |dt| RawCell::Date(dt.date())),
        Data::DateTimeIso(text) => text
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map_or_else(|| RawCell::from(text.as_str()), RawCell::Date),
        Data::DurationIso(text) => RawCell::from(text.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::{raw_cell, WorkbookReader};
    use crate::table::normalize::RawCell;
    use crate::table::{SourceError, TableSource};
    use calamine::Data;
    use chrono::NaiveDate;

    #[test]
    fn missing_file_is_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = WorkbookReader::new(dir.path().join("absent.xlsx"));
        let err = reader.read().unwrap_err();
        assert!(matches!(err, SourceError::FileAccess { .. }), "unexpected: {err}");
    }

    #[test]
    fn non_spreadsheet_content_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.xlsx");
        std::fs::write(&path, b"date;amount\n01.01.2024;100\n").unwrap();

        let err = WorkbookReader::new(&path).read().unwrap_err();
        assert!(matches!(err, SourceError::Format(_)), "unexpected: {err}");
    }

    #[test]
    fn describe_uses_file_name() {
        let reader = WorkbookReader::new("/data/sales.xlsx");
        assert_eq!(reader.describe(), "Workbook (sales.xlsx)");
    }

    #[test]
    fn iso_datetime_cells_become_dates() {
        let cell = raw_cell(&Data::DateTimeIso("2024-02-29T10:00:00".to_string()));
        assert_eq!(cell, RawCell::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert_eq!(raw_cell(&Data::Int(4)), RawCell::Number(4.0));
        assert_eq!(raw_cell(&Data::String(String::new())), RawCell::Empty);
    }
}
