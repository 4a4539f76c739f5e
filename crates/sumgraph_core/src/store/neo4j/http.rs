//! Transactional HTTP endpoint (`POST {uri}/db/{database}/tx/commit`).

use super::{created_parameter, SummaryFields, FIND_CORRELATED_CYPHER, WRITE_RECORD_CYPHER};
use crate::config::StoreSettings;
use crate::model::record::{CorrelationRecord, RecordId, RecordSummary};
use crate::store::{StoreError, StoreResult};
use log::{debug, error};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

pub(super) struct HttpTransport {
    settings: StoreSettings,
    client: Client,
}

impl HttpTransport {
    pub(super) fn new(settings: StoreSettings) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub(super) fn write(&self, record: &CorrelationRecord) -> StoreResult<()> {
        self.run(WRITE_RECORD_CYPHER, write_parameters(record))?;
        Ok(())
    }

    pub(super) fn find_correlated(
        &self,
        id: RecordId,
        limit: u32,
    ) -> StoreResult<Vec<RecordSummary>> {
        let rows = self.run(
            FIND_CORRELATED_CYPHER,
            json!({ "id": id.to_string(), "limit": limit }),
        )?;
        rows.iter().map(|row| parse_summary_row(row)).collect()
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.settings.uri, self.settings.database
        )
    }

    fn run(&self, statement: &str, parameters: Value) -> StoreResult<Vec<Vec<Value>>> {
        let started_at = Instant::now();
        let response = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.settings.user, Some(&self.settings.password))
            .json(&statement_body(statement, parameters))
            .send()
            .map_err(|err| {
                error!(
                    "event=store_request module=store backend=neo4j protocol=http status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                StoreError::Unavailable(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "server returned {status}: {body}"
            )));
        }

        let body: CommitResponse = response
            .json()
            .map_err(|err| StoreError::InvalidData(format!("unreadable server response: {err}")))?;
        debug!(
            "event=store_request module=store backend=neo4j protocol=http status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        rows_of(body)
    }
}

fn statement_body(statement: &str, parameters: Value) -> Value {
    json!({
        "statements": [{
            "statement": statement,
            "parameters": parameters,
        }]
    })
}

fn write_parameters(record: &CorrelationRecord) -> Value {
    json!({
        "id": record.id.to_string(),
        "sum": record.sum,
        "sum_key": record.bucket(),
        "period_start": record.period_start.to_string(),
        "period_end": record.period_end.to_string(),
        "path": record.artifact_reference,
        "created": created_parameter(record),
    })
}

fn rows_of(response: CommitResponse) -> StoreResult<Vec<Vec<Value>>> {
    if let Some(err) = response.errors.first() {
        return Err(StoreError::Query(format!("{}: {}", err.code, err.message)));
    }
    Ok(response
        .results
        .into_iter()
        .flat_map(|result| result.data)
        .map(|data| data.row)
        .collect())
}

fn parse_summary_row(row: &[Value]) -> StoreResult<RecordSummary> {
    SummaryFields {
        id: text_at(row, 0, "id")?,
        sum: row
            .get(1)
            .and_then(Value::as_f64)
            .ok_or_else(|| StoreError::InvalidData("missing `sum` in result row".to_string()))?,
        image_path: text_at(row, 2, "image_path")?,
        period_start: text_at(row, 3, "period_start")?,
        period_end: text_at(row, 4, "period_end")?,
        created: text_at(row, 5, "created")?,
    }
    .into_summary()
}

fn text_at<'a>(row: &'a [Value], index: usize, name: &str) -> StoreResult<&'a str> {
    row.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidData(format!("missing `{name}` in result row")))
}
