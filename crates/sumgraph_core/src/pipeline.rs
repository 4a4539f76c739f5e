//! Load -> aggregate -> generate -> publish -> correlate orchestration.
//!
//! # Responsibility
//! - Sequence table sources, aggregation, artifact generation and the
//!   correlation store for one interactive session.
//! - Own the forward-only state machine and reject out-of-order calls.
//!
//! # Invariants
//! - States advance `Empty -> TableLoaded -> SumComputed -> ArtifactGenerated
//!   -> Published`; loading a table discards all downstream state.
//! - A failed transition leaves the state unchanged.
//! - Every publish builds a new record id; nothing is deduplicated.
//! - Store and generator clients are created on first use and then reused.

use crate::aggregate::{distinct_dates, min_max_date, sum_by_period};
use crate::artifact::{ArtifactError, ArtifactGenerator, OpenRouterImageGenerator};
use crate::error::{PipelineError, PipelineResult};
use crate::model::record::{CorrelationRecord, RecordSummary};
use crate::model::table::{CanonicalTable, PeriodSum};
use crate::store::{CorrelationStore, Neo4jCorrelationStore, StoreError};
use crate::table::TableSource;
use chrono::{NaiveDate, NaiveDateTime};
use log::{error, info};
use once_cell::unsync::OnceCell;
use std::rc::Rc;

/// Externally visible pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    TableLoaded,
    SumComputed,
    ArtifactGenerated,
    Published,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::TableLoaded => "TableLoaded",
            Self::SumComputed => "SumComputed",
            Self::ArtifactGenerated => "ArtifactGenerated",
            Self::Published => "Published",
        }
    }
}

/// Largest sum magnitude a published record can carry exactly (2^53).
///
/// Records store the sum as `f64`; larger totals are computed but not published.
pub const MAX_EXACT_SUM: u64 = 1 << 53;

/// Sum computed for one inclusive period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodTotal {
    sum: PeriodSum,
    date_from: NaiveDate,
    date_to: NaiveDate,
}

#[derive(Debug)]
struct Session {
    table: CanonicalTable,
    source: String,
}

enum Stage {
    Empty,
    TableLoaded {
        session: Rc<Session>,
    },
    SumComputed {
        session: Rc<Session>,
        total: PeriodTotal,
    },
    ArtifactGenerated {
        session: Rc<Session>,
        total: PeriodTotal,
        artifact: String,
    },
    Published {
        session: Rc<Session>,
        total: PeriodTotal,
        artifact: String,
        record: CorrelationRecord,
    },
}

impl Stage {
    fn state(&self) -> PipelineState {
        match self {
            Self::Empty => PipelineState::Empty,
            Self::TableLoaded { .. } => PipelineState::TableLoaded,
            Self::SumComputed { .. } => PipelineState::SumComputed,
            Self::ArtifactGenerated { .. } => PipelineState::ArtifactGenerated,
            Self::Published { .. } => PipelineState::Published,
        }
    }

    fn session(&self) -> Option<&Rc<Session>> {
        match self {
            Self::Empty => None,
            Self::TableLoaded { session }
            | Self::SumComputed { session, .. }
            | Self::ArtifactGenerated { session, .. }
            | Self::Published { session, .. } => Some(session),
        }
    }

    fn total(&self) -> Option<PeriodTotal> {
        match self {
            Self::Empty | Self::TableLoaded { .. } => None,
            Self::SumComputed { total, .. }
            | Self::ArtifactGenerated { total, .. }
            | Self::Published { total, .. } => Some(*total),
        }
    }

    fn artifact(&self) -> Option<&str> {
        match self {
            Self::ArtifactGenerated { artifact, .. } | Self::Published { artifact, .. } => {
                Some(artifact)
            }
            _ => None,
        }
    }
}

/// Client created on first use and reused for the pipeline lifetime.
struct LazyService<T: ?Sized, E> {
    instance: OnceCell<Rc<T>>,
    factory: Box<dyn Fn() -> Result<Rc<T>, E>>,
}

impl<T: ?Sized, E> LazyService<T, E> {
    fn new(factory: impl Fn() -> Result<Rc<T>, E> + 'static) -> Self {
        Self {
            instance: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    fn get(&self) -> Result<&T, E> {
        self.instance
            .get_or_try_init(|| (self.factory)())
            .map(|instance| &**instance)
    }
}

/// Session orchestrator driven by discrete user actions.
pub struct Pipeline {
    stage: Stage,
    store: LazyService<dyn CorrelationStore, StoreError>,
    generator: LazyService<dyn ArtifactGenerator, ArtifactError>,
}

impl Pipeline {
    /// Builds a pipeline whose clients are created by the given factories on first use.
    pub fn new(
        store_factory: impl Fn() -> Result<Rc<dyn CorrelationStore>, StoreError> + 'static,
        generator_factory: impl Fn() -> Result<Rc<dyn ArtifactGenerator>, ArtifactError> + 'static,
    ) -> Self {
        Self {
            stage: Stage::Empty,
            store: LazyService::new(store_factory),
            generator: LazyService::new(generator_factory),
        }
    }

    /// Builds a pipeline around already constructed clients.
    pub fn with_services(
        store: Rc<dyn CorrelationStore>,
        generator: Rc<dyn ArtifactGenerator>,
    ) -> Self {
        Self::new(
            move || Ok(Rc::clone(&store)),
            move || Ok(Rc::clone(&generator)),
        )
    }

    /// Uses the graph store and image generator configured in the environment.
    pub fn from_env() -> Self {
        Self::new(
            || Ok(Rc::new(Neo4jCorrelationStore::from_env()?) as Rc<dyn CorrelationStore>),
            || Ok(Rc::new(OpenRouterImageGenerator::from_env()?) as Rc<dyn ArtifactGenerator>),
        )
    }

    pub fn state(&self) -> PipelineState {
        self.stage.state()
    }

    /// Loads a fresh table, discarding sum, artifact and publish status.
    ///
    /// Returns the row count. On failure the previous state is kept.
    pub fn load(&mut self, source: &dyn TableSource) -> PipelineResult<usize> {
        let table = source.read().map_err(|err| {
            error!(
                "event=pipeline_load module=pipeline status=error state={} error={}",
                self.state().as_str(),
                err
            );
            err
        })?;

        let rows = table.len();
        info!(
            "event=pipeline_load module=pipeline status=ok rows={} from_state={}",
            rows,
            self.state().as_str()
        );
        self.stage = Stage::TableLoaded {
            session: Rc::new(Session {
                table,
                source: source.describe(),
            }),
        };
        Ok(rows)
    }

    pub fn table(&self) -> Option<&CanonicalTable> {
        self.stage.session().map(|session| &session.table)
    }

    /// Description of the loaded source, if any.
    pub fn source_info(&self) -> Option<&str> {
        self.stage.session().map(|session| session.source.as_str())
    }

    /// Distinct dates of the loaded table, ascending; empty when nothing is loaded.
    pub fn all_dates(&self) -> Vec<NaiveDate> {
        self.table().map(distinct_dates).unwrap_or_default()
    }

    /// First and last date of the loaded table.
    pub fn date_span(&self) -> PipelineResult<(NaiveDate, NaiveDate)> {
        let table = self.require_table("date_span")?;
        Ok(min_max_date(table)?)
    }

    /// Parses ISO bounds and sums the loaded table over them.
    ///
    /// Replaces any earlier sum and drops a pending artifact or published record.
    pub fn compute_sum(&mut self, date_from: &str, date_to: &str) -> PipelineResult<PeriodSum> {
        let session = Rc::clone(self.require_session("compute_sum")?);
        let date_from = parse_iso_date(date_from)?;
        let date_to = parse_iso_date(date_to)?;

        let total = PeriodTotal {
            sum: sum_by_period(&session.table, date_from, date_to),
            date_from,
            date_to,
        };
        info!(
            "event=pipeline_sum module=pipeline status=ok from={} to={} sum={}",
            date_from, date_to, total.sum
        );
        self.stage = Stage::SumComputed { session, total };
        Ok(total.sum)
    }

    pub fn current_sum(&self) -> Option<PeriodSum> {
        self.stage.total().map(|total| total.sum)
    }

    /// Generates an artifact labelled with the current sum.
    ///
    /// On failure the pipeline stays where it was and the call may be retried.
    pub fn generate_artifact(&mut self) -> PipelineResult<&str> {
        let (session, total) = match (self.stage.session(), self.stage.total()) {
            (Some(session), Some(total)) => (Rc::clone(session), total),
            _ => return Err(self.invalid("generate_artifact")),
        };

        let generator = self.generator.get()?;
        let artifact = generator.generate(&total.sum.to_string())?;
        info!(
            "event=pipeline_generate module=pipeline status=ok sum={} artifact={}",
            total.sum, artifact
        );

        self.stage = Stage::ArtifactGenerated {
            session,
            total,
            artifact,
        };
        Ok(self.stage.artifact().unwrap_or_default())
    }

    /// Locator of the current artifact, if one was generated this session.
    pub fn artifact_reference(&self) -> Option<&str> {
        self.stage.artifact()
    }

    /// Writes a new correlation record for the current artifact.
    ///
    /// Each call creates a record with a fresh id, including repeated calls
    /// from `Published`.
    pub fn publish(&mut self) -> PipelineResult<CorrelationRecord> {
        let (session, total, artifact) = match &self.stage {
            Stage::ArtifactGenerated {
                session,
                total,
                artifact,
            }
            | Stage::Published {
                session,
                total,
                artifact,
                ..
            } => (Rc::clone(session), *total, artifact.clone()),
            _ => return Err(self.invalid("publish")),
        };
        if total.sum.unsigned_abs() > MAX_EXACT_SUM {
            return Err(PipelineError::SumOutOfRange(total.sum));
        }

        let record = CorrelationRecord::new(
            total.sum as f64,
            total.date_from,
            total.date_to,
            artifact.as_str(),
        );
        let store = self.store.get()?;
        store.write(&record)?;
        info!(
            "event=pipeline_publish module=pipeline status=ok record_id={} bucket={}",
            record.id,
            record.bucket()
        );

        self.stage = Stage::Published {
            session,
            total,
            artifact,
            record: record.clone(),
        };
        Ok(record)
    }

    /// Last record written in this session.
    pub fn published_record(&self) -> Option<&CorrelationRecord> {
        match &self.stage {
            Stage::Published { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Lists records sharing the current record's bucket.
    ///
    /// Publishes first when the current artifact has not been published yet.
    pub fn find_correlated(&mut self, limit: u32) -> PipelineResult<Vec<RecordSummary>> {
        if self.state() == PipelineState::ArtifactGenerated {
            self.publish()?;
        }
        let id = match &self.stage {
            Stage::Published { record, .. } => record.id,
            _ => return Err(self.invalid("find_correlated")),
        };

        let hits = self.store.get()?.find_correlated(id, limit)?;
        info!(
            "event=pipeline_correlate module=pipeline status=ok record_id={} hits={}",
            id,
            hits.len()
        );
        Ok(hits)
    }

    fn require_session(&self, operation: &'static str) -> PipelineResult<&Rc<Session>> {
        self.stage
            .session()
            .ok_or_else(|| self.invalid(operation))
    }

    fn require_table(&self, operation: &'static str) -> PipelineResult<&CanonicalTable> {
        self.require_session(operation)
            .map(|session| &session.table)
    }

    fn invalid(&self, operation: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            operation,
            state: self.state().as_str(),
        }
    }
}

/// Parses an ISO calendar date; a full ISO datetime is accepted and truncated.
fn parse_iso_date(input: &str) -> PipelineResult<NaiveDate> {
    let trimmed = input.trim();
    trimmed
        .parse::<NaiveDate>()
        .or_else(|_| trimmed.parse::<NaiveDateTime>().map(|dt| dt.date()))
        .map_err(|_| PipelineError::InvalidRange(trimmed.to_string()))
}
