//! Correlation stores.
//!
//! # Responsibility
//! - Define the write/query contract for the same-sum correlation graph.
//! - Provide a remote graph implementation and a local SQLite implementation.
//!
//! # Invariants
//! - Writes merge the bucket node, create-or-overwrite the record node and
//!   ensure the record->bucket link, all in one unit.
//! - Correlation reads exclude the queried record, order by creation time
//!   descending, and return an empty list for unknown ids.

pub mod neo4j;
pub mod sqlite;

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::record::{CorrelationRecord, RecordId, RecordSummary};
use thiserror::Error;

pub use neo4j::Neo4jCorrelationStore;
pub use sqlite::SqliteCorrelationStore;

/// Default maximum number of correlated records returned by one query.
pub const DEFAULT_CORRELATION_LIMIT: u32 = 20;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("correlation store unavailable: {0}")]
    Unavailable(String),
    #[error("correlation store rejected statement: {0}")]
    Query(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid stored record data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Append-only store answering "which records share this record's bucket".
pub trait CorrelationStore {
    /// Persists one record and links it to its sum bucket.
    fn write(&self, record: &CorrelationRecord) -> StoreResult<()>;

    /// Lists other records in the bucket of `id`, newest first, at most `limit`.
    fn find_correlated(&self, id: RecordId, limit: u32) -> StoreResult<Vec<RecordSummary>>;
}

impl<S: CorrelationStore + ?Sized> CorrelationStore for Box<S> {
    fn write(&self, record: &CorrelationRecord) -> StoreResult<()> {
        (**self).write(record)
    }

    fn find_correlated(&self, id: RecordId, limit: u32) -> StoreResult<Vec<RecordSummary>> {
        (**self).find_correlated(id, limit)
    }
}
