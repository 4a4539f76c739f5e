//! Table sources and shared normalization.
//!
//! # Responsibility
//! - Define the single `read` capability every table source offers.
//! - Obtain a raw grid per source and hand it to [`normalize`].
//!
//! # Invariants
//! - Sources never normalize on their own; all cell policy lives in `normalize`.
//! - Reading an unchanged backing source twice yields identical rows.

pub mod normalize;
pub mod sheets;
pub mod workbook;

use crate::config::ConfigError;
use crate::model::table::CanonicalTable;
use thiserror::Error;

pub use normalize::{normalize, DateFormat, RawCell, RawGrid, DEFAULT_DATE_FORMAT};
pub use sheets::{extract_document_id, SpreadsheetServiceReader};
pub use workbook::WorkbookReader;

pub type SourceResult<T> = Result<T, SourceError>;

/// Failure while obtaining a raw grid from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("spreadsheet service authentication failed: {0}")]
    Authentication(String),
    #[error("spreadsheet service request failed: {0}")]
    RemoteAccess(String),
    #[error("cannot access workbook `{path}`: {message}")]
    FileAccess { path: String, message: String },
    #[error("unreadable table format: {0}")]
    Format(String),
}

/// Capability shared by all table sources.
pub trait TableSource {
    /// Loads and normalizes the backing table.
    fn read(&self) -> SourceResult<CanonicalTable>;

    /// Human-readable origin, e.g. `Workbook (sales.xlsx)`.
    fn describe(&self) -> String;
}
