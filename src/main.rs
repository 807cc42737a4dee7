use std::path::PathBuf;

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::Parser;

use suzaku_hk::data::export::write_table;
use suzaku_hk::data::loader::{load_catalog, load_filter_config};
use suzaku_hk::data::model::{parse_timestamp, Timestamp, Window};
use suzaku_hk::{ExtractOptions, Pipeline, PipelineConfig};

/// Rows shown when no output file is given.
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "suzaku-hk", version, about = "Merge housekeeping telemetry over an observation window")]
struct Cli {
    /// Coverage catalog (.csv or .json)
    #[arg(long, default_value = "conf/suzaku_data_list.csv")]
    catalog: PathBuf,

    /// Column filters (.yaml or .json)
    #[arg(long, default_value = "conf/filters.yaml")]
    filters: PathBuf,

    /// Directory holding the ae<id>.hk files
    #[arg(long)]
    data_dir: PathBuf,

    /// Window start, e.g. "2012-01-23 01:27:51"
    #[arg(long, value_parser = timestamp_arg)]
    start: Timestamp,

    /// Window end (inclusive)
    #[arg(long, value_parser = timestamp_arg)]
    end: Timestamp,

    /// Forward-fill missing values
    #[arg(long)]
    fill_nan: bool,

    /// Resample interval in seconds
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    resample: Option<u32>,

    /// Drop columns whose variance does not exceed this value
    #[arg(long)]
    variance_threshold: Option<f64>,

    /// Concurrent file reads
    #[arg(long, default_value_t = 4)]
    jobs: usize,

    /// Print the column selection table before extracting
    #[arg(long)]
    show_selection: bool,

    /// Write the merged table here (.parquet or .csv)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn timestamp_arg(s: &str) -> std::result::Result<Timestamp, String> {
    parse_timestamp(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let catalog = load_catalog(&cli.catalog)
        .with_context(|| format!("loading catalog {}", cli.catalog.display()))?;
    let filter = load_filter_config(&cli.filters)
        .with_context(|| format!("loading filters {}", cli.filters.display()))?;
    let window = Window::new(cli.start, cli.end).context("invalid window")?;

    let config = PipelineConfig {
        data_dir: cli.data_dir.clone(),
        jobs: cli.jobs,
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(catalog, window, filter, config);
    let selection = pipeline.setup().context("setting up pipeline")?;
    if cli.show_selection {
        println!("{selection}");
    }

    let options = ExtractOptions {
        fill_nan: cli.fill_nan,
        resample_interval_secs: cli.resample,
        variance_threshold: cli.variance_threshold,
    };
    let table = pipeline.extract(&options).context("extracting telemetry")?;

    match &cli.output {
        Some(path) => write_table(&table, path)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let head = table.take(&(0..table.len().min(PREVIEW_ROWS)).collect::<Vec<_>>());
            let batch = head.to_record_batch()?;
            println!("{}", pretty_format_batches(&[batch])?);
            println!("{} rows x {} columns", table.len(), table.columns.len());
        }
    }
    Ok(())
}
