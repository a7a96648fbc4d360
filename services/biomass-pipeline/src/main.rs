//! Forest biomass pipeline CLI.
//!
//! Runs the prepare, mask, summarize and difference phases over a data
//! root described by a YAML configuration file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use biomass_pipeline::report::{format_consolidation_table, format_inventory_table};
use biomass_pipeline::{consolidate, discover, Phase, Pipeline, PipelineConfig, ReportFormat};

#[derive(Parser, Debug)]
#[command(name = "biomass-pipeline")]
#[command(about = "Forest biomass statistics by ownership and county", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BIOMASS_CONFIG", default_value = "config/pipeline.yaml")]
    config: PathBuf,

    /// Restrict to one region (default: all configured)
    #[arg(short, long)]
    region: Option<String>,

    /// Log level, overrides the configuration (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: json or pretty
    #[arg(long)]
    log_format: Option<String>,

    /// Report format
    #[arg(long, value_enum, default_value = "table")]
    report: ReportFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run all phases in order, or a single phase
    Run {
        #[arg(short, long, value_enum)]
        phase: Option<Phase>,
    },

    /// List the layers found under the data root
    Discover,

    /// Merge per-year summary tables into one table
    Consolidate {
        /// Replace an existing consolidated table
        #[arg(long)]
        force: bool,
    },

    /// Load and check the configuration, then exit
    ValidateConfig,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);

    if format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("Invalid configuration {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    init_tracing(level, format);

    info!(
        config = %cli.config.display(),
        data_root = %config.data_root.display(),
        regions = ?config.regions.iter().map(|r| r.name()).collect::<Vec<_>>(),
        years = %config.years,
        "Loaded configuration"
    );

    match cli.command {
        Commands::Run { phase } => {
            let phases = match phase {
                Some(p) => vec![p],
                None => Phase::ALL.to_vec(),
            };
            let pipeline = Pipeline::from_config(Arc::new(config));
            let report = pipeline.run(&phases, cli.region.as_deref()).await?;

            println!("{}", report.render(cli.report)?);

            if report.has_failures() {
                error!("One or more units failed");
                std::process::exit(1);
            }
        }

        Commands::Discover => {
            let inventory = discover(&config)?;
            match cli.report {
                ReportFormat::Table => println!("{}", format_inventory_table(&inventory)),
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&inventory)?),
            }
        }

        Commands::Consolidate { force } => {
            let regions = config.select_regions(cli.region.as_deref())?;
            let result = consolidate(&config, &regions, force)?;
            match cli.report {
                ReportFormat::Table => println!("{}", format_consolidation_table(&result)),
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }

        Commands::ValidateConfig => {
            config.select_regions(cli.region.as_deref())?;
            println!(
                "Configuration OK: {} region(s), years {}, data root {}",
                config.regions.len(),
                config.years,
                config.data_root.display()
            );
        }
    }

    Ok(())
}
