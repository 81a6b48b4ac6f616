//! CLI entry point for the batch time ETL.
//!
//! `run` executes one incremental run per config file (one per source
//! system); `derive` recomputes PT/ST/status for a single extract without
//! touching any published output or state.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use batch_time_etl::config::{EtlConfig, LoggingConfig};
use batch_time_etl::extract::{read_extract, write_dataset};
use batch_time_etl::metrics::enrich::Deriver;
use batch_time_etl::pipeline;
use batch_time_etl::record::SourceSystem;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_LOG_FILE: &str = "logs/batch_time_etl.log";

#[derive(Parser)]
#[command(name = "batch_time_etl")]
#[command(about = "Derives batch processing and standard times from MES/SFC extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the incremental ETL for each config (one per source system)
    Run {
        /// JSON config file; repeat for several source systems
        #[arg(short, long = "config", value_name = "FILE", required = true)]
        configs: Vec<PathBuf>,

        /// Date the hot/warm/cold tiers are computed against (default: today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
    },
    /// Derive PT, ST and completion status for one extract into a CSV
    Derive {
        /// Source extract (CSV)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Source system the extract came from
        #[arg(short, long, default_value = "mes")]
        system: SourceSystem,

        /// CSV file to write the derived rows to
        #[arg(short, long, default_value = "batch_report.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { configs, today } => {
            let loaded: Vec<(PathBuf, Result<EtlConfig>)> = configs
                .into_iter()
                .map(|path| {
                    let config = EtlConfig::load(&path)
                        .with_context(|| format!("loading config {}", path.display()));
                    (path, config)
                })
                .collect();

            let logging = loaded
                .iter()
                .find_map(|(_, c)| c.as_ref().ok())
                .map(|c| c.logging.clone())
                .unwrap_or_default();
            let _guard = init_logging(&logging);

            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let total = loaded.len();
            let mut failed = 0;

            for (path, config) in loaded {
                let outcome = config.and_then(|config| {
                    pipeline::run(&config, today)
                        .with_context(|| format!("{} run failed", config.system.label()))
                });
                match outcome {
                    Ok(summary) => info!(
                        config = %path.display(),
                        system = %summary.system,
                        rows_merged = summary.rows_merged,
                        "Source run succeeded"
                    ),
                    Err(e) => {
                        failed += 1;
                        error!(config = %path.display(), error = %format!("{e:#}"), "Source run failed");
                    }
                }
            }

            if failed > 0 {
                bail!("{failed} of {total} source runs failed");
            }
        }
        Commands::Derive {
            input,
            system,
            output,
        } => {
            let _guard = init_logging(&LoggingConfig::default());

            let mut extract = read_extract(&input)?;
            let summary =
                Deriver::new(system.default_start_field()).enrich(&mut extract.records);
            write_dataset(&output, &extract.records)?;

            info!(
                output = %output.display(),
                records = summary.records,
                on_time = summary.on_time,
                overdue = summary.overdue,
                unknown = summary.unknown,
                "Derived report written"
            );
        }
    }

    Ok(())
}

/// Colored stderr plus a JSON rolling log file. The returned guard must be
/// held until exit so buffered file output is flushed.
fn init_logging(logging: &LoggingConfig) -> WorkerGuard {
    let log_file_path = logging
        .file
        .clone()
        .or_else(|| std::env::var("LOG_FILE_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    let log_dir = log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = log_file_path
        .file_name()
        .unwrap_or(OsStr::new("batch_time_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let level = logging.level.as_deref().unwrap_or("info");
    let stderr_filter =
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    let json_filter =
        EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug"));

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(json_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}
