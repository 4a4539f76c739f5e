//! Correlation record model.
//!
//! # Responsibility
//! - Define the record written to correlation stores after an artifact exists.
//! - Derive the bucket key that is the sole correlation axis.
//!
//! # Invariants
//! - `id` is generated at creation and never reused for another record.
//! - Records are append-only; nothing in core mutates a built record.
//! - Bucket key is `sum` rounded to the nearest integer, halves away from zero.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of one correlation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the correlation bucket for a sum.
///
/// `100.49 -> 100`, `100.5 -> 101`.
pub fn bucket_key(sum: f64) -> i64 {
    sum.round() as i64
}

/// Persisted record linking a generated artifact to its period sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub id: RecordId,
    pub sum: f64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Opaque artifact locator, a file path for the bundled generator.
    pub artifact_reference: String,
    pub created_at: DateTime<Utc>,
    /// Reserved; never populated by core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CorrelationRecord {
    /// Builds a record with a fresh id and the current timestamp.
    pub fn new(
        sum: f64,
        period_start: NaiveDate,
        period_end: NaiveDate,
        artifact_reference: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            sum,
            period_start,
            period_end,
            artifact_reference: artifact_reference.into(),
            created_at: Utc::now(),
            embedding: None,
        }
    }

    pub fn bucket(&self) -> i64 {
        bucket_key(self.sum)
    }

    /// Projects the record into the read model returned by correlation queries.
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            sum: self.sum,
            period_start: self.period_start,
            period_end: self.period_end,
            artifact_reference: self.artifact_reference.clone(),
            created_at: self.created_at,
        }
    }
}

/// Read model for records sharing a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub sum: f64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub artifact_reference: String,
    pub created_at: DateTime<Utc>,
}
