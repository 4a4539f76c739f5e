//! Period sums over dated tables, with artifact generation and a same-sum
//! correlation graph.

pub mod aggregate;
pub mod artifact;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod table;

pub use aggregate::{distinct_dates, min_max_date, sum_by_period, AggregateError};
pub use artifact::{ArtifactError, ArtifactGenerator, OpenRouterImageGenerator};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::{bucket_key, CorrelationRecord, RecordId, RecordSummary};
pub use model::table::{CanonicalTable, PeriodSum, TableRow};
pub use pipeline::{Pipeline, PipelineState, MAX_EXACT_SUM};
pub use store::{
    CorrelationStore, Neo4jCorrelationStore, SqliteCorrelationStore, StoreError,
    DEFAULT_CORRELATION_LIMIT,
};
pub use table::{
    normalize, DateFormat, RawCell, SourceError, SpreadsheetServiceReader, TableSource,
    WorkbookReader,
};
