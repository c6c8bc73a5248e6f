//! macropanel CLI: refresh, rebuild-indicators and status commands.
//!
//! Commands:
//! - `refresh [--source <tag>]`: collect, curate, assemble, compute indicators
//! - `rebuild-indicators`: recompute indicators from the published master panel
//! - `status`: list store tiers with file sizes and row counts
//!
//! Exit codes: 0 success, 2 required series missing, 3 required adapter
//! unavailable, 4 storage failure, 5 schema violation, 1 anything else.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use macropanel_core::cancel::CancelToken;
use macropanel_core::data::{StorageFormat, StoreStatus};
use macropanel_runner::{AdapterRegistry, Credentials, Pipeline, PipelineConfig, RunError, RunSummary};

const LOG_ENV: &str = "MACROPANEL_LOG";

#[derive(Parser)]
#[command(
    name = "macropanel",
    version,
    about = "macropanel: macro-indicator data pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline config (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store root. Overrides the config file and MACROPANEL_DATA_ROOT.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Table format: parquet or csv.
    #[arg(long, global = true)]
    format: Option<StorageFormat>,

    /// Print the run summary as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Log level when MACROPANEL_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, curate, assemble and compute indicators.
    Refresh {
        /// Collect and curate only this source; assembly still uses every
        /// source's latest curated panel.
        #[arg(long)]
        source: Option<String>,
    },
    /// Recompute indicators from the latest master panel.
    RebuildIndicators,
    /// List store tiers, files, sizes and row counts.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let run_error = err.downcast_ref::<RunError>();
            if let Some(summary) = run_error.and_then(RunError::summary) {
                // partial summaries still show what failed per source
                if let Err(e) = print_summary(summary, cli.json) {
                    eprintln!("error: cannot print summary: {e:#}");
                }
            }
            eprintln!("error: {err:#}");
            let code = run_error.map_or(1, RunError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).map_err(RunError::from)?;
    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    tracing::debug!(data_root = %config.data_root.display(), format = %config.format, "config loaded");

    match &cli.command {
        Commands::Refresh { source } => {
            let cancel = CancelToken::new();
            let credentials = Credentials::from_env();
            let registry = AdapterRegistry::build(&config, &credentials, &cancel);
            let pipeline = Pipeline::new(config, registry, cancel);
            let summary = match source {
                Some(tag) => pipeline.refresh_source(tag)?,
                None => pipeline.refresh()?,
            };
            print_summary(&summary, cli.json)
        }
        Commands::RebuildIndicators => {
            let pipeline = Pipeline::new(config, AdapterRegistry::new(), CancelToken::new());
            let summary = pipeline.rebuild_indicators()?;
            print_summary(&summary, cli.json)
        }
        Commands::Status => {
            let pipeline = Pipeline::new(config, AdapterRegistry::new(), CancelToken::new());
            let status = pipeline.status()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", summary.to_json().context("serialize run summary")?);
    } else {
        print!("{}", summary.render_table());
    }
    Ok(())
}

fn print_status(status: &StoreStatus) {
    println!("Store: {} ({})", status.root.display(), status.format);
    for tier in &status.tiers {
        let total: u64 = tier.files.iter().map(|f| f.bytes).sum();
        println!();
        println!("{}: {} files, {}", tier.tier, tier.files.len(), format_size(total));
        if tier.files.is_empty() {
            continue;
        }
        println!("{:<56} {:>8} {:>10}", "File", "Rows", "Size");
        println!("{}", "-".repeat(76));
        for file in &tier.files {
            let name = file
                .path
                .strip_prefix(&status.root)
                .unwrap_or(&file.path)
                .display()
                .to_string();
            let rows = file.rows.map_or_else(|| "-".to_string(), |r| r.to_string());
            println!("{:<56} {:>8} {:>10}", name, rows, format_size(file.bytes));
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
