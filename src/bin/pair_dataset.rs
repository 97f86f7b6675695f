//! CLI entry point for the perpetual pair dataset builder.
//!
//! Subcommands:
//!   - `build`           Fetch, align and persist the dataset from Hyperliquid
//!   - `report`          Validate a persisted dataset and write the report artifacts
//!   - `config-template` Print the default configuration as JSON

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use perp_pair_dataset::config::PipelineConfig;
use perp_pair_dataset::errors::Result;
use perp_pair_dataset::pipeline::DatasetPipeline;
use perp_pair_dataset::report::run_report;
use perp_pair_dataset::source::{HyperliquidSource, HYPERLIQUID_FUNDING_EVENTS_PER_DAY};

#[derive(Parser)]
#[command(
    name = "pair-dataset",
    version,
    about = "Build and validate an aligned perpetual-futures pair dataset",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch candles and funding, align the instruments and write the dataset
    Build(BuildArgs),
    /// Validate a persisted dataset
    Report(ReportArgs),
    /// Print the default configuration
    ConfigTemplate,
}

#[derive(Parser)]
struct BuildArgs {
    /// Path to the JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the output Parquet path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the history start, e.g. "2022-01-01 00:00:00"
    #[arg(long)]
    start: Option<String>,

    /// Also write the validation report into the configured report directory
    #[arg(long, default_value_t = false)]
    with_report: bool,
}

#[derive(Parser)]
struct ReportArgs {
    /// Persisted dataset
    #[arg(long, default_value = "pair_merged_1d.parquet")]
    input: PathBuf,

    /// Directory receiving the CSV artifacts
    #[arg(long, default_value = "report")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Build(args) => build(args).await,
        Commands::Report(args) => report(args),
        Commands::ConfigTemplate => config_template(),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(category = err.category(), "{}", err);
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

/// Configuration for a Hyperliquid build: the file when given, otherwise the defaults
/// with hourly settlement.
fn build_config(args: &BuildArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = PipelineConfig::from_json_file(path)?;
            if config.funding.expected_events_per_day != HYPERLIQUID_FUNDING_EVENTS_PER_DAY {
                warn!(
                    "funding.expected_events_per_day is {} but Hyperliquid settles {} times a day, \
                     most days will be flagged incomplete",
                    config.funding.expected_events_per_day, HYPERLIQUID_FUNDING_EVENTS_PER_DAY
                );
            }
            config
        }
        None => {
            let mut config = PipelineConfig::default();
            config.funding.expected_events_per_day = HYPERLIQUID_FUNDING_EVENTS_PER_DAY;
            config
        }
    };
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(start) = &args.start {
        config.start = start.clone();
    }
    Ok(config)
}

async fn build(args: BuildArgs) -> Result<ExitCode> {
    let config = build_config(&args)?;
    let report_dir = config.report_dir.clone();
    let source = HyperliquidSource::mainnet().await?;
    let outcome = DatasetPipeline::new(config, source).run().await?;
    info!(
        "{} rows written to {}",
        outcome.dataset.len(),
        outcome.output_path.display()
    );

    if args.with_report {
        return report(ReportArgs {
            input: outcome.output_path,
            out_dir: report_dir,
        });
    }
    Ok(ExitCode::SUCCESS)
}

fn report(args: ReportArgs) -> Result<ExitCode> {
    let report = run_report(&args.input, &args.out_dir)?;
    if report.has_findings() {
        warn!(
            "{} findings in {}, see {}",
            report.findings.len(),
            args.input.display(),
            args.out_dir.display()
        );
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn config_template() -> Result<ExitCode> {
    let template = PipelineConfig::default().to_json_pretty()?;
    println!("{}", template);
    Ok(ExitCode::SUCCESS)
}
