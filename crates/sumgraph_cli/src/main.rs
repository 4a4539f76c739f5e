//! `sumgraph` command line entry point.
//!
//! # Responsibility
//! - Map flags onto one pipeline session and print the outcome.
//! - Report failures with their error category and a non-zero exit code.

use clap::{Args, Parser, Subcommand};
use log::warn;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use sumgraph_core::artifact::ArtifactGenerator;
use sumgraph_core::config::{date_format_override, env_lookup, ConfigError};
use sumgraph_core::store::CorrelationStore;
use sumgraph_core::{
    default_log_level, init_logging, DateFormat, OpenRouterImageGenerator, Pipeline,
    PipelineError, PipelineResult, RecordSummary, SourceError, SpreadsheetServiceReader,
    SqliteCorrelationStore, TableSource, WorkbookReader, DEFAULT_CORRELATION_LIMIT,
};

#[derive(Parser)]
#[command(name = "sumgraph", version)]
#[command(about = "Sum dated amounts, render the sum and correlate equal sums")]
struct Cli {
    /// trace|debug|info|warn|error
    #[arg(long, env = "SUMGRAPH_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Absolute log directory (default: ./logs)
    #[arg(long, env = "SUMGRAPH_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the distinct dates of a table
    Dates(SourceArgs),
    /// Sum a table over an inclusive date range
    Sum {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Sum, then optionally generate, publish and correlate
    Run {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        steps: StepArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    #[command(flatten)]
    origin: SourceOrigin,

    /// Service-account credentials for --sheet
    #[arg(long, env = "GOOGLE_SHEETS_CREDENTIALS_PATH")]
    credentials: Option<String>,

    /// strftime pattern of date cells (default: %d.%m.%Y)
    #[arg(long)]
    date_format: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceOrigin {
    /// Local .xlsx/.xls/.ods workbook
    #[arg(long)]
    workbook: Option<PathBuf>,

    /// Spreadsheet id or document URL
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Args)]
struct RangeArgs {
    /// First day, YYYY-MM-DD (default: earliest date in the table)
    #[arg(long)]
    from: Option<String>,

    /// Last day, YYYY-MM-DD (default: latest date in the table)
    #[arg(long)]
    to: Option<String>,
}

#[derive(Args)]
struct StepArgs {
    /// Generate an artifact for the sum
    #[arg(long)]
    generate: bool,

    /// Publish the artifact to the correlation store
    #[arg(long)]
    publish: bool,

    /// List records sharing the sum bucket (publishes first)
    #[arg(long)]
    similar: bool,

    #[arg(long, default_value_t = DEFAULT_CORRELATION_LIMIT)]
    limit: u32,

    /// Use a local SQLite correlation store instead of Neo4j
    #[arg(long, env = "SUMGRAPH_LOCAL_STORE")]
    local_store: Option<PathBuf>,
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    start_logging(&cli);

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {}", err.kind().as_str(), err);
            ExitCode::FAILURE
        }
    }
}

fn start_logging(cli: &Cli) {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let log_dir = match &cli.log_dir {
        Some(dir) => dir.clone(),
        None => match std::env::current_dir() {
            Ok(cwd) => cwd.join("logs"),
            Err(err) => {
                eprintln!("warning: logging disabled: {err}");
                return;
            }
        },
    };
    if let Err(err) = init_logging(level, &log_dir.to_string_lossy()) {
        eprintln!("warning: logging disabled: {err}");
    }
}

fn execute(command: Command) -> PipelineResult<()> {
    match command {
        Command::Dates(source) => {
            let mut pipeline = Pipeline::from_env();
            load(&mut pipeline, &source)?;
            for date in pipeline.all_dates() {
                println!("{date}");
            }
            Ok(())
        }
        Command::Sum { source, range } => {
            let mut pipeline = Pipeline::from_env();
            load(&mut pipeline, &source)?;
            compute(&mut pipeline, &range)?;
            Ok(())
        }
        Command::Run {
            source,
            range,
            steps,
        } => {
            let mut pipeline = build_pipeline(steps.local_store.clone());
            load(&mut pipeline, &source)?;
            compute(&mut pipeline, &range)?;

            if !(steps.generate || steps.publish || steps.similar) {
                return Ok(());
            }
            let artifact = pipeline.generate_artifact()?;
            println!("artifact: {artifact}");

            if steps.publish {
                let record = pipeline.publish()?;
                println!("published: {} (bucket {})", record.id, record.bucket());
            }
            if steps.similar {
                let hits = pipeline.find_correlated(steps.limit)?;
                if let Some(record) = pipeline.published_record() {
                    println!("record: {}", record.id);
                }
                print_correlated(&hits);
            }
            Ok(())
        }
    }
}

fn build_pipeline(local_store: Option<PathBuf>) -> Pipeline {
    match local_store {
        Some(path) => Pipeline::new(
            move || Ok(Rc::new(SqliteCorrelationStore::open(&path)?) as Rc<dyn CorrelationStore>),
            || Ok(Rc::new(OpenRouterImageGenerator::from_env()?) as Rc<dyn ArtifactGenerator>),
        ),
        None => Pipeline::from_env(),
    }
}

fn load(pipeline: &mut Pipeline, args: &SourceArgs) -> PipelineResult<()> {
    let source = open_source(args)?;
    let rows = pipeline.load(source.as_ref())?;
    println!(
        "loaded {rows} rows from {}",
        pipeline.source_info().unwrap_or_default()
    );
    Ok(())
}

fn compute(pipeline: &mut Pipeline, range: &RangeArgs) -> PipelineResult<()> {
    let (first, last) = match (&range.from, &range.to) {
        (Some(from), Some(to)) => (from.clone(), to.clone()),
        _ => {
            let (first, last) = pipeline.date_span()?;
            (
                range.from.clone().unwrap_or_else(|| first.to_string()),
                range.to.clone().unwrap_or_else(|| last.to_string()),
            )
        }
    };
    let sum = pipeline.compute_sum(&first, &last)?;
    println!("sum {first}..={last}: {sum}");
    Ok(())
}

fn open_source(args: &SourceArgs) -> PipelineResult<Box<dyn TableSource>> {
    let date_format = resolve_date_format(args.date_format.clone())?;
    let origin = &args.origin;
    if let Some(path) = &origin.workbook {
        return Ok(Box::new(
            WorkbookReader::new(path.clone()).with_date_format(date_format),
        ));
    }
    let document = origin.sheet.as_deref().unwrap_or_default();
    let reader = SpreadsheetServiceReader::new(document, args.credentials.as_deref())?;
    Ok(Box::new(reader.with_date_format(date_format)))
}

fn resolve_date_format(explicit: Option<String>) -> PipelineResult<DateFormat> {
    let Some(pattern) = explicit.or_else(|| date_format_override(env_lookup)) else {
        return Ok(DateFormat::default());
    };
    DateFormat::new(pattern.as_str()).ok_or_else(|| {
        warn!("event=cli_date_format module=cli status=error pattern={pattern}");
        PipelineError::from(SourceError::from(ConfigError::InvalidValue {
            name: "date format",
            reason: format!("`{pattern}` is not a valid strftime pattern"),
        }))
    })
}

fn print_correlated(hits: &[RecordSummary]) {
    if hits.is_empty() {
        println!("no correlated records");
        return;
    }
    for hit in hits {
        println!(
            "{}  sum={}  period={}..={}  artifact={}  created={}",
            hit.id,
            hit.sum,
            hit.period_start,
            hit.period_end,
            hit.artifact_reference,
            hit.created_at.to_rfc3339()
        );
    }
}
