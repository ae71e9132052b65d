use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Args, Parser, Subcommand};
use log::info;

use cxblind::batch::run_batch;
use cxblind::config::RunConfig;
use cxblind::data::loader;
use cxblind::params::blocks::{block_records, read_blocks, read_series_list};
use cxblind::params::memory::read_csv_records;
use cxblind::params::SqliteParameterStore;
use cxblind::runner::DEFAULT_CONFIGURATION;

#[derive(Parser)]
#[command(name = "cxblind", version, about = "Blinding cuts for detector event data")]
struct Cli {
    /// JSON run configuration; falls back to $CXBLIND_CONFIG, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Blind one or more samples and write their decisions.
    Run(RunArgs),
    /// Load a parameter CSV into a SQLite parameter database.
    ImportCsv(ImportCsvArgs),
    /// Load a threshold block file for one detector and parameter.
    ImportBlocks(ImportBlocksArgs),
    /// Print the first rows of a written decision table.
    Show(ShowArgs),
    /// Print the effective configuration as JSON.
    PrintConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Sample names.
    samples: Vec<String>,
    /// File with one sample name per line.
    #[arg(long)]
    samples_file: Option<PathBuf>,
    /// Override the configured row stride.
    #[arg(long)]
    step: Option<usize>,
    /// Override the configured output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ImportCsvArgs {
    csv: PathBuf,
    #[arg(long)]
    db: PathBuf,
}

#[derive(Args)]
struct ImportBlocksArgs {
    blocks: PathBuf,
    #[arg(long)]
    db: PathBuf,
    #[arg(long)]
    series_list: PathBuf,
    #[arg(long)]
    detector: String,
    #[arg(long)]
    parameter: String,
    #[arg(long, default_value = DEFAULT_CONFIGURATION)]
    configuration: String,
}

#[derive(Args)]
struct ShowArgs {
    path: PathBuf,
    #[arg(long, default_value_t = 10)]
    rows: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(RunConfig::resolve(cli.config.as_deref())?, args),
        Commands::ImportCsv(args) => import_csv(args),
        Commands::ImportBlocks(args) => import_blocks(args),
        Commands::Show(args) => show(&args.path, args.rows),
        Commands::PrintConfig => {
            let config = RunConfig::resolve(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run(mut config: RunConfig, args: RunArgs) -> Result<()> {
    let mut samples = args.samples;
    if let Some(path) = &args.samples_file {
        samples.extend(read_series_list(path)?);
    }
    if samples.is_empty() {
        bail!("no samples given");
    }
    if let Some(step) = args.step {
        config.step = step.max(1);
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let store = config
        .parameters
        .open()
        .with_context(|| format!("opening parameters {:?}", config.parameters))?;
    let report = run_batch(&config, &samples, store.as_ref());

    for (sample, run) in &report.succeeded {
        println!(
            "{sample}: {} / {} rows blinded ({} parameter binds)",
            run.blinded_events, run.rows_processed, run.rebinds
        );
    }
    for (sample, err) in &report.failed {
        println!("{sample}: FAILED with status {}: {err}", err.code());
    }
    if !report.all_succeeded() {
        bail!("{} of {} samples failed", report.failed.len(), samples.len());
    }
    Ok(())
}

fn import_csv(args: ImportCsvArgs) -> Result<()> {
    let records = read_csv_records(&args.csv)?;
    let mut store = SqliteParameterStore::open(&args.db)?;
    let imported = store.import(records)?;
    info!("imported {imported} rows into {}", args.db.display());
    println!("{imported} parameters imported ({} total)", store.count()?);
    Ok(())
}

fn import_blocks(args: ImportBlocksArgs) -> Result<()> {
    let series = read_series_list(&args.series_list)?;
    let blocks = read_blocks(&args.blocks)?;
    let records = block_records(&series, &blocks, &args.detector, &args.configuration, &args.parameter)?;
    if records.len() < series.len() {
        info!(
            "{} series lie past the last block of {}",
            series.len() - records.len(),
            args.blocks.display()
        );
    }

    let mut store = SqliteParameterStore::open(&args.db)?;
    let imported = store.import(records)?;
    println!("{imported} block values imported for detector {}", args.detector);
    Ok(())
}

fn show(path: &Path, rows: usize) -> Result<()> {
    let info = loader::probe_table(path)?;
    let values = loader::read_columns(path, &info.columns)?;

    let fields: Vec<Field> = info
        .columns
        .iter()
        .map(|c| Field::new(c, DataType::Float64, false))
        .collect();
    let arrays: Vec<ArrayRef> = values
        .into_iter()
        .map(|column| {
            let head: Vec<f64> = column.into_iter().take(rows).collect();
            Arc::new(Float64Array::from(head)) as ArrayRef
        })
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;

    println!("{}", pretty_format_batches(&[batch])?);
    println!("{} of {} rows", rows.min(info.rows), info.rows);
    Ok(())
}
