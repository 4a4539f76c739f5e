//! Bolt protocol client (`neo4j://`, `bolt://`) driven on a private runtime.

use super::{created_parameter, SummaryFields, FIND_CORRELATED_CYPHER, WRITE_RECORD_CYPHER};
use crate::config::StoreSettings;
use crate::model::record::{CorrelationRecord, RecordId, RecordSummary};
use crate::store::{StoreError, StoreResult};
use log::{debug, error};
use neo4rs::{query, ConfigBuilder, Graph, Row};
use once_cell::unsync::OnceCell;
use std::time::Instant;
use tokio::runtime::{Builder, Runtime};

pub(super) struct BoltTransport {
    settings: StoreSettings,
    runtime: Runtime,
    graph: OnceCell<Graph>,
}

impl BoltTransport {
    pub(super) fn new(settings: StoreSettings) -> StoreResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| StoreError::Unavailable(format!("cannot start runtime: {err}")))?;
        Ok(Self {
            settings,
            runtime,
            graph: OnceCell::new(),
        })
    }

    pub(super) fn write(&self, record: &CorrelationRecord) -> StoreResult<()> {
        let statement = query(WRITE_RECORD_CYPHER)
            .param("sum_key", record.bucket())
            .param("id", record.id.to_string())
            .param("sum", record.sum)
            .param("period_start", record.period_start.to_string())
            .param("period_end", record.period_end.to_string())
            .param("path", record.artifact_reference.clone())
            .param("created", created_parameter(record));

        let started_at = Instant::now();
        let graph = self.graph()?;
        self.runtime
            .block_on(graph.run(statement))
            .map_err(|err| self.request_failed(started_at, err))?;
        debug!(
            "event=store_request module=store backend=neo4j protocol=bolt status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    pub(super) fn find_correlated(
        &self,
        id: RecordId,
        limit: u32,
    ) -> StoreResult<Vec<RecordSummary>> {
        let statement = query(FIND_CORRELATED_CYPHER)
            .param("id", id.to_string())
            .param("limit", i64::from(limit));

        let started_at = Instant::now();
        let graph = self.graph()?;
        let rows = self
            .runtime
            .block_on(async {
                let mut stream = graph.execute(statement).await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await? {
                    rows.push(row);
                }
                Ok::<_, neo4rs::Error>(rows)
            })
            .map_err(|err| self.request_failed(started_at, err))?;
        debug!(
            "event=store_request module=store backend=neo4j protocol=bolt status=ok duration_ms={} rows={}",
            started_at.elapsed().as_millis(),
            rows.len()
        );

        rows.iter().map(parse_summary_row).collect()
    }

    fn graph(&self) -> StoreResult<&Graph> {
        self.graph.get_or_try_init(|| {
            let config = ConfigBuilder::default()
                .uri(self.settings.uri.as_str())
                .user(self.settings.user.as_str())
                .password(self.settings.password.as_str())
                .db(self.settings.database.as_str())
                .build()
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            self.runtime
                .block_on(Graph::connect(config))
                .map_err(|err| StoreError::Unavailable(err.to_string()))
        })
    }

    fn request_failed(&self, started_at: Instant, err: neo4rs::Error) -> StoreError {
        error!(
            "event=store_request module=store backend=neo4j protocol=bolt status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        );
        match err {
            neo4rs::Error::Neo4j(server) => StoreError::Query(format!("{}: {}", server.code(), server.message())),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

fn parse_summary_row(row: &Row) -> StoreResult<RecordSummary> {
    let id: String = column(row, "id")?;
    let image_path: String = column(row, "image_path")?;
    let period_start: String = column(row, "period_start")?;
    let period_end: String = column(row, "period_end")?;
    let created: String = column(row, "created")?;

    SummaryFields {
        id: &id,
        sum: column(row, "sum")?,
        image_path: &image_path,
        period_start: &period_start,
        period_end: &period_end,
        created: &created,
    }
    .into_summary()
}

fn column<T: serde::de::DeserializeOwned>(row: &Row, name: &str) -> StoreResult<T> {
    row.get::<T>(name)
        .map_err(|err| StoreError::InvalidData(format!("column `{name}`: {err}")))
}
