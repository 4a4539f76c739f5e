//! Neo4j correlation graph.
//!
//! # Responsibility
//! - Persist `(:Image)-[:HAS_SUM]->(:Sum)` structures for each record.
//! - Answer bucket-mate queries with Cypher over Bolt or the HTTP endpoint,
//!   chosen by the URI scheme.
//!
//! # Invariants
//! - Missing connection settings fail at construction, before any request.
//! - Every call is one auto-commit transaction; no local caching.
//! - Transport failures map to `Unavailable`, server-side Cypher errors to `Query`.
//! - Bucket mates are ordered by the stored datetime value, newest first.

mod bolt;
mod http;

use super::{CorrelationStore, StoreError, StoreResult};
use crate::config::{env_lookup, StoreProtocol, StoreSettings};
use crate::model::record::{CorrelationRecord, RecordId, RecordSummary};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::info;

use bolt::BoltTransport;
use http::HttpTransport;

const WRITE_RECORD_CYPHER: &str = "MERGE (s:Sum {value: $sum_key})
MERGE (i:Image {id: $id})
SET i.sum = $sum,
    i.period_start = $period_start,
    i.period_end = $period_end,
    i.image_path = $path,
    i.created = datetime($created)
MERGE (i)-[:HAS_SUM]->(s)";

// `created_value` keeps the temporal value for ordering; the string form
// drops trailing zeros of the fraction and does not sort chronologically.
const FIND_CORRELATED_CYPHER: &str =
    "MATCH (t:Image {id: $id})-[:HAS_SUM]->(s:Sum)<-[:HAS_SUM]-(other:Image)
WHERE other.id <> $id
RETURN DISTINCT other.id AS id, other.sum AS sum, other.image_path AS image_path,
    other.period_start AS period_start, other.period_end AS period_end,
    toString(other.created) AS created, other.created AS created_value
ORDER BY created_value DESC
LIMIT $limit";

enum Transport {
    Http(HttpTransport),
    Bolt(BoltTransport),
}

/// Remote graph store.
pub struct Neo4jCorrelationStore {
    transport: Transport,
}

impl Neo4jCorrelationStore {
    /// Builds a store from `NEO4J_URI`, `NEO4J_USER` and `NEO4J_PASSWORD`.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        Self::new(StoreSettings::from_lookup(lookup)?)
    }

    /// Prepares the client; no connection is opened until the first call.
    pub fn new(settings: StoreSettings) -> StoreResult<Self> {
        let transport = match settings.protocol {
            StoreProtocol::Http => Transport::Http(HttpTransport::new(settings)?),
            StoreProtocol::Bolt => Transport::Bolt(BoltTransport::new(settings)?),
        };
        Ok(Self { transport })
    }

    pub fn protocol(&self) -> StoreProtocol {
        match self.transport {
            Transport::Http(_) => StoreProtocol::Http,
            Transport::Bolt(_) => StoreProtocol::Bolt,
        }
    }
}

impl CorrelationStore for Neo4jCorrelationStore {
    fn write(&self, record: &CorrelationRecord) -> StoreResult<()> {
        match &self.transport {
            Transport::Http(http) => http.write(record)?,
            Transport::Bolt(bolt) => bolt.write(record)?,
        }
        info!(
            "event=store_write module=store backend=neo4j protocol={:?} status=ok record_id={} bucket={}",
            self.protocol(),
            record.id,
            record.bucket()
        );
        Ok(())
    }

    fn find_correlated(&self, id: RecordId, limit: u32) -> StoreResult<Vec<RecordSummary>> {
        match &self.transport {
            Transport::Http(http) => http.find_correlated(id, limit),
            Transport::Bolt(bolt) => bolt.find_correlated(id, limit),
        }
    }
}

/// `created` parameter: RFC 3339 with microseconds, parsed by Cypher `datetime()`.
fn created_parameter(record: &CorrelationRecord) -> String {
    record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Projection of one `FIND_CORRELATED_CYPHER` row, before validation.
struct SummaryFields<'a> {
    id: &'a str,
    sum: f64,
    image_path: &'a str,
    period_start: &'a str,
    period_end: &'a str,
    created: &'a str,
}

impl SummaryFields<'_> {
    fn into_summary(self) -> StoreResult<RecordSummary> {
        let id = self
            .id
            .parse::<RecordId>()
            .map_err(|_| StoreError::InvalidData(format!("invalid record id `{}`", self.id)))?;
        let created_at = DateTime::parse_from_rfc3339(self.created)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|_| StoreError::InvalidData(format!("invalid created `{}`", self.created)))?;

        Ok(RecordSummary {
            id,
            sum: self.sum,
            artifact_reference: self.image_path.to_string(),
            period_start: parse_period(self.period_start, "period_start")?,
            period_end: parse_period(self.period_end, "period_end")?,
            created_at,
        })
    }
}

fn parse_period(text: &str, name: &str) -> StoreResult<NaiveDate> {
    text.parse::<NaiveDate>()
        .map_err(|_| StoreError::InvalidData(format!("invalid {name} `{text}`")))
}

#[cfg(test)]
mod tests {
    use super::{Neo4jCorrelationStore, SummaryFields, FIND_CORRELATED_CYPHER};
    use crate::config::{
        ConfigError, StoreProtocol, ENV_LEGACY_NEO4J_PASSWORD, ENV_LEGACY_NEO4J_URI,
        ENV_LEGACY_NEO4J_USER, ENV_NEO4J_PASSWORD, ENV_NEO4J_URI, ENV_NEO4J_USER,
    };
    use crate::store::StoreError;
    use chrono::NaiveDate;

    #[test]
    fn missing_settings_fail_before_any_request() {
        let err = Neo4jCorrelationStore::from_lookup(|name| {
            (name == ENV_NEO4J_URI).then(|| "http://127.0.0.1:9".to_string())
        })
        .err()
        .expect("construction must fail");
        assert!(matches!(
            err,
            StoreError::Configuration(ConfigError::MissingVar(name)) if name == ENV_NEO4J_USER
        ));
    }

    #[test]
    fn uri_scheme_selects_protocol() {
        let store = Neo4jCorrelationStore::from_lookup(|name| match name {
            ENV_NEO4J_URI => Some("http://db:7474".to_string()),
            ENV_NEO4J_USER | ENV_NEO4J_PASSWORD => Some("neo4j".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(store.protocol(), StoreProtocol::Http);

        let store = Neo4jCorrelationStore::from_lookup(|name| match name {
            ENV_LEGACY_NEO4J_URI => Some("neo4j://127.0.0.1:9".to_string()),
            ENV_LEGACY_NEO4J_USER | ENV_LEGACY_NEO4J_PASSWORD => Some("neo4j".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(store.protocol(), StoreProtocol::Bolt);
    }

    #[test]
    fn correlated_rows_are_ordered_by_temporal_value() {
        assert!(FIND_CORRELATED_CYPHER.contains("other.created AS created_value"));
        assert!(FIND_CORRELATED_CYPHER.contains("ORDER BY created_value DESC"));
        assert!(!FIND_CORRELATED_CYPHER.contains("ORDER BY created DESC"));
    }

    #[test]
    fn summary_fields_validate_ids_and_dates() {
        let summary = SummaryFields {
            id: "11111111-2222-4333-8444-555555555555",
            sum: 100.0,
            image_path: "images/b.png",
            period_start: "2024-01-01",
            period_end: "2024-01-31",
            created: "2024-02-01T10:00:00.12345Z",
        }
        .into_summary()
        .unwrap();
        assert_eq!(summary.period_end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(summary.created_at.timestamp_subsec_micros(), 123_450);

        let err = SummaryFields {
            id: "not-a-uuid",
            sum: 1.0,
            image_path: "",
            period_start: "2024-01-01",
            period_end: "2024-01-01",
            created: "2024-02-01T10:00:00Z",
        }
        .into_summary()
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }
}
