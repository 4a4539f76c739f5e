//! SQLite-backed correlation graph.
//!
//! # Responsibility
//! - Model bucket nodes, record nodes and record->bucket links as tables.
//! - Serve offline runs and in-memory tests with the remote store's semantics.
//!
//! # Invariants
//! - Bucket rows are inserted only when absent.
//! - Record rows are overwritten by id, never deleted.
//! - Each write runs in one transaction.

use super::{CorrelationStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::model::record::{CorrelationRecord, RecordId, RecordSummary};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, Row};
use std::path::Path;

const PERIOD_DATE_FORMAT: &str = "%Y-%m-%d";

/// Local correlation store.
pub struct SqliteCorrelationStore {
    conn: Connection,
}

impl SqliteCorrelationStore {
    /// Opens (or creates) a store file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory store.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection already bootstrapped by [`crate::db`].
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl CorrelationStore for SqliteCorrelationStore {
    fn write(&self, record: &CorrelationRecord) -> StoreResult<()> {
        let bucket = record.bucket();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sum_buckets (value) VALUES (?1);",
            [bucket],
        )?;
        tx.execute(
            "INSERT INTO records (
                id,
                sum,
                period_start,
                period_end,
                artifact_reference,
                created_at,
                created_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                sum = excluded.sum,
                period_start = excluded.period_start,
                period_end = excluded.period_end,
                artifact_reference = excluded.artifact_reference,
                created_at = excluded.created_at,
                created_at_us = excluded.created_at_us;",
            params![
                record.id.to_string(),
                record.sum,
                record.period_start.format(PERIOD_DATE_FORMAT).to_string(),
                record.period_end.format(PERIOD_DATE_FORMAT).to_string(),
                record.artifact_reference.as_str(),
                record
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
                record.created_at.timestamp_micros(),
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO record_buckets (record_id, bucket_value) VALUES (?1, ?2);",
            params![record.id.to_string(), bucket],
        )?;
        tx.commit()?;

        info!(
            "event=store_write module=store backend=sqlite status=ok record_id={} bucket={}",
            record.id, bucket
        );
        Ok(())
    }

    fn find_correlated(&self, id: RecordId, limit: u32) -> StoreResult<Vec<RecordSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT
                other.id AS id,
                other.sum AS sum,
                other.period_start AS period_start,
                other.period_end AS period_end,
                other.artifact_reference AS artifact_reference,
                other.created_at AS created_at,
                other.created_at_us AS created_at_us
            FROM record_buckets target
            JOIN record_buckets link ON link.bucket_value = target.bucket_value
            JOIN records other ON other.id = link.record_id
            WHERE target.record_id = ?1
              AND other.id <> ?1
            ORDER BY other.created_at_us DESC, other.id ASC
            LIMIT ?2;",
        )?;

        let mut rows = stmt.query(params![id.to_string(), i64::from(limit)])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(parse_summary_row(row)?);
        }

        debug!(
            "event=store_find module=store backend=sqlite status=ok record_id={} hits={}",
            id,
            summaries.len()
        );
        Ok(summaries)
    }
}

fn parse_summary_row(row: &Row<'_>) -> StoreResult<RecordSummary> {
    let id_text: String = row.get("id")?;
    let id = id_text
        .parse::<RecordId>()
        .map_err(|_| StoreError::InvalidData(format!("invalid record id `{id_text}`")))?;

    let created_text: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_text)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| {
            StoreError::InvalidData(format!("invalid created_at `{created_text}` for {id}"))
        })?;

    Ok(RecordSummary {
        id,
        sum: row.get("sum")?,
        period_start: parse_period_date(row, "period_start")?,
        period_end: parse_period_date(row, "period_end")?,
        artifact_reference: row.get("artifact_reference")?,
        created_at,
    })
}

fn parse_period_date(row: &Row<'_>, column: &str) -> StoreResult<NaiveDate> {
    let text: String = row.get(column)?;
    NaiveDate::parse_from_str(&text, PERIOD_DATE_FORMAT)
        .map_err(|_| StoreError::InvalidData(format!("invalid {column} `{text}`")))
}

#[cfg(test)]
mod tests {
    use super::SqliteCorrelationStore;
    use crate::model::record::{CorrelationRecord, RecordId};
    use crate::store::CorrelationStore;
    use chrono::{Duration, NaiveDate};

    fn record(sum: f64) -> CorrelationRecord {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        CorrelationRecord::new(sum, day, day, format!("images/{sum}.png"))
    }

    #[test]
    fn rewriting_a_record_keeps_one_node() {
        let store = SqliteCorrelationStore::in_memory().unwrap();
        let first = record(5.0);
        let mut mate = record(5.0);
        mate.created_at = first.created_at + Duration::seconds(1);
        store.write(&first).unwrap();
        store.write(&mate).unwrap();
        store.write(&mate).unwrap();

        let hits = store.find_correlated(first.id, 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, mate.id);
    }

    #[test]
    fn unknown_id_yields_empty_list() {
        let store = SqliteCorrelationStore::in_memory().unwrap();
        store.write(&record(1.0)).unwrap();
        assert!(store.find_correlated(RecordId::new(), 20).unwrap().is_empty());
    }

    #[test]
    fn zero_limit_yields_empty_list() {
        let store = SqliteCorrelationStore::in_memory().unwrap();
        let first = record(3.0);
        store.write(&first).unwrap();
        store.write(&record(3.0)).unwrap();
        assert!(store.find_correlated(first.id, 0).unwrap().is_empty());
    }
}
