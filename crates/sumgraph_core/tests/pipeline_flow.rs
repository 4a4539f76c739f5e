use chrono::NaiveDate;
use std::cell::Cell;
use std::rc::Rc;
use sumgraph_core::artifact::{ArtifactError, ArtifactResult};
use sumgraph_core::config::ConfigError;
use sumgraph_core::store::StoreResult;
use sumgraph_core::table::SourceResult;
use sumgraph_core::{
    normalize, ArtifactGenerator, CanonicalTable, CorrelationRecord, CorrelationStore,
    DateFormat, ErrorKind, Pipeline, PipelineState, RawCell, RecordId, RecordSummary,
    SourceError, SqliteCorrelationStore, StoreError, TableSource,
};

struct GridSource(Vec<Vec<RawCell>>);

impl GridSource {
    fn new(rows: &[&[&str]]) -> Self {
        Self(
            rows.iter()
                .map(|row| row.iter().map(|cell| RawCell::from(*cell)).collect())
                .collect(),
        )
    }

    fn reference() -> Self {
        Self::new(&[
            &["date", "amount"],
            &["01.01.2024", "100"],
            &["15.01.2024", "50"],
            &["bad", "xx"],
        ])
    }
}

impl TableSource for GridSource {
    fn read(&self) -> SourceResult<CanonicalTable> {
        Ok(normalize(&self.0, &DateFormat::default()))
    }

    fn describe(&self) -> String {
        "Grid (fixture)".to_string()
    }
}

struct UnreachableSource;

impl TableSource for UnreachableSource {
    fn read(&self) -> SourceResult<CanonicalTable> {
        Err(SourceError::RemoteAccess("connection refused".to_string()))
    }

    fn describe(&self) -> String {
        "Unreachable".to_string()
    }
}

#[derive(Default)]
struct FakeGenerator {
    calls: Cell<u32>,
    fail: Cell<bool>,
}

impl ArtifactGenerator for FakeGenerator {
    fn generate(&self, label: &str) -> ArtifactResult<String> {
        self.calls.set(self.calls.get() + 1);
        if self.fail.get() {
            return Err(ArtifactError::NoArtifact("empty response".to_string()));
        }
        Ok(format!("images/{label}-{}.png", self.calls.get()))
    }
}

struct DownStore;

impl CorrelationStore for DownStore {
    fn write(&self, _record: &CorrelationRecord) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn find_correlated(&self, _id: RecordId, _limit: u32) -> StoreResult<Vec<RecordSummary>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

fn local_pipeline() -> (Pipeline, Rc<SqliteCorrelationStore>, Rc<FakeGenerator>) {
    let store = Rc::new(SqliteCorrelationStore::in_memory().unwrap());
    let generator = Rc::new(FakeGenerator::default());
    let pipeline = Pipeline::with_services(store.clone(), generator.clone());
    (pipeline, store, generator)
}

#[test]
fn full_session_publishes_and_correlates() {
    let (mut pipeline, store, generator) = local_pipeline();
    assert_eq!(pipeline.state(), PipelineState::Empty);

    assert_eq!(pipeline.load(&GridSource::reference()).unwrap(), 3);
    assert_eq!(pipeline.state(), PipelineState::TableLoaded);
    assert_eq!(pipeline.source_info(), Some("Grid (fixture)"));

    assert_eq!(pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap(), 150);
    assert_eq!(pipeline.state(), PipelineState::SumComputed);

    let artifact = pipeline.generate_artifact().unwrap().to_string();
    assert_eq!(artifact, "images/150-1.png");
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);
    assert_eq!(pipeline.artifact_reference(), Some(artifact.as_str()));

    let first = pipeline.publish().unwrap();
    assert_eq!(first.sum, 150.0);
    assert_eq!(first.bucket(), 150);
    assert_eq!(first.artifact_reference, artifact);
    assert_eq!(pipeline.state(), PipelineState::Published);

    let second = pipeline.publish().unwrap();
    assert_ne!(first.id, second.id);

    let hits = pipeline.find_correlated(20).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, first.id);
    assert_eq!(store.find_correlated(first.id, 20).unwrap()[0].id, second.id);
    assert_eq!(generator.calls.get(), 1);
}

#[test]
fn correlating_an_unpublished_artifact_publishes_it_first() {
    let (mut pipeline, store, _generator) = local_pipeline();
    let earlier = CorrelationRecord::new(
        150.0,
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        "images/old.png",
    );
    store.write(&earlier).unwrap();

    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();

    let hits = pipeline.find_correlated(20).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Published);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, earlier.id);
    assert!(pipeline.published_record().is_some());
}

#[test]
fn out_of_order_calls_are_invalid_state() {
    let (mut pipeline, _store, generator) = local_pipeline();

    let err = pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(pipeline.date_span().unwrap_err().kind(), ErrorKind::InvalidState);

    pipeline.load(&GridSource::reference()).unwrap();
    assert_eq!(
        pipeline.generate_artifact().unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(pipeline.publish().unwrap_err().kind(), ErrorKind::InvalidState);

    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    assert_eq!(pipeline.publish().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        pipeline.find_correlated(20).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(pipeline.state(), PipelineState::SumComputed);
    assert_eq!(generator.calls.get(), 0);
}

#[test]
fn reload_discards_downstream_state() {
    let (mut pipeline, _store, _generator) = local_pipeline();
    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();
    pipeline.publish().unwrap();

    pipeline
        .load(&GridSource::new(&[&["d", "a"], &["03.03.2024", "7"]]))
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::TableLoaded);
    assert_eq!(pipeline.current_sum(), None);
    assert_eq!(pipeline.artifact_reference(), None);
    assert!(pipeline.published_record().is_none());
    assert_eq!(
        pipeline.all_dates(),
        vec![NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()]
    );
}

#[test]
fn recomputing_the_sum_drops_the_pending_artifact() {
    let (mut pipeline, _store, _generator) = local_pipeline();
    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();

    assert_eq!(pipeline.compute_sum("2024-01-02", "2024-01-31").unwrap(), 50);
    assert_eq!(pipeline.state(), PipelineState::SumComputed);
    assert_eq!(pipeline.artifact_reference(), None);
}

#[test]
fn failures_leave_the_state_unchanged() {
    let (mut pipeline, _store, generator) = local_pipeline();

    let err = pipeline.load(&UnreachableSource).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceAccess);
    assert_eq!(pipeline.state(), PipelineState::Empty);

    pipeline.load(&GridSource::reference()).unwrap();
    let err = pipeline.compute_sum("01.01.2024", "2024-01-31").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
    assert_eq!(pipeline.state(), PipelineState::TableLoaded);

    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    generator.fail.set(true);
    let err = pipeline.generate_artifact().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactGeneration);
    assert_eq!(pipeline.state(), PipelineState::SumComputed);
    assert_eq!(pipeline.current_sum(), Some(150));

    generator.fail.set(false);
    pipeline.generate_artifact().unwrap();
    let err = pipeline.load(&UnreachableSource).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceAccess);
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);
}

#[test]
fn unavailable_store_keeps_the_artifact_pending() {
    let mut pipeline = Pipeline::with_services(Rc::new(DownStore), Rc::new(FakeGenerator::default()));
    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();

    let err = pipeline.publish().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);

    let err = pipeline.find_correlated(20).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);
}

#[test]
fn services_are_created_lazily_and_once() {
    let store_builds = Rc::new(Cell::new(0_u32));
    let generator_builds = Rc::new(Cell::new(0_u32));
    let store_counter = Rc::clone(&store_builds);
    let generator_counter = Rc::clone(&generator_builds);

    let mut pipeline = Pipeline::new(
        move || {
            store_counter.set(store_counter.get() + 1);
            Ok(Rc::new(SqliteCorrelationStore::in_memory()?) as Rc<dyn CorrelationStore>)
        },
        move || {
            generator_counter.set(generator_counter.get() + 1);
            Ok(Rc::new(FakeGenerator::default()) as Rc<dyn ArtifactGenerator>)
        },
    );
    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    assert_eq!((store_builds.get(), generator_builds.get()), (0, 0));

    pipeline.generate_artifact().unwrap();
    pipeline.generate_artifact().unwrap();
    pipeline.publish().unwrap();
    pipeline.find_correlated(20).unwrap();
    assert_eq!((store_builds.get(), generator_builds.get()), (1, 1));
}

#[test]
fn missing_store_configuration_surfaces_on_first_use() {
    let mut pipeline = Pipeline::new(
        || Err(StoreError::Configuration(ConfigError::MissingVar("NEO4J_URI"))),
        || Ok(Rc::new(FakeGenerator::default()) as Rc<dyn ArtifactGenerator>),
    );
    pipeline.load(&GridSource::reference()).unwrap();
    pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();

    let err = pipeline.publish().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);
}

#[test]
fn sums_beyond_exact_float_range_are_not_published() {
    let (mut pipeline, store, _generator) = local_pipeline();
    pipeline
        .load(&GridSource::new(&[
            &["date", "amount"],
            &["01.01.2024", "9007199254740992"],
            &["02.01.2024", "2"],
        ]))
        .unwrap();
    let sum = pipeline.compute_sum("2024-01-01", "2024-01-31").unwrap();
    assert_eq!(sum, 9_007_199_254_740_994);
    pipeline.generate_artifact().unwrap();

    let err = pipeline.publish().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
    assert_eq!(pipeline.state(), PipelineState::ArtifactGenerated);
    assert!(pipeline.published_record().is_none());

    pipeline.compute_sum("2024-01-02", "2024-01-31").unwrap();
    pipeline.generate_artifact().unwrap();
    let record = pipeline.publish().unwrap();
    assert_eq!(record.sum, 2.0);
    assert!(store.find_correlated(record.id, 20).unwrap().is_empty());
}
