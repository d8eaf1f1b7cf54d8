//! WorldPop population raster pipeline.
//!
//! Conserves ~100m WorldPop rasters to ~1km integer rasters, catalogs them
//! in PostGIS and keeps the results in object storage.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use grid_processor::{
    conserve_file, read_grid, ConserveConfig, EmptyGridPolicy, QuantileMethod, RasterConserver,
};
use ingestion::{Pipeline, PipelineConfig, PipelineSummary};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use worldpop_common::{IntDataType, RasterFileInfo};

#[derive(Parser, Debug)]
#[command(name = "worldpop")]
#[command(about = "Count-conserving WorldPop raster pipeline")]
struct Cli {
    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Conserve a single GeoTIFF
    Resample {
        /// Input raster
        input: PathBuf,

        /// Output raster (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        conserve: ConserveArgs,
    },

    /// Print size, georeferencing and totals of a raster as JSON
    Inspect {
        /// Raster to inspect
        path: PathBuf,
    },

    /// Fetch, conserve, catalog and upload every raster of a country and year
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Read sources from a local directory instead of the mirror
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Scratch directory for downloads
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Reprocess rasters already in storage
        #[arg(long)]
        force: bool,

        /// Skip database inserts
        #[arg(long)]
        no_database: bool,

        #[command(flatten)]
        conserve: ConserveArgs,
    },

    /// Upload already conserved rasters from a directory
    Upload {
        /// Directory to upload from
        dir: PathBuf,

        /// Overwrite existing objects
        #[arg(long)]
        force: bool,

        /// Pipeline configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Insert tiles for rasters already in storage
    Insert {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// ISO3 country code
    #[arg(short = 'C', long, env = "WORLDPOP_COUNTRY")]
    country: String,

    /// Census year
    #[arg(short, long, env = "WORLDPOP_YEAR", default_value = "2020")]
    year: u32,

    /// Pipeline configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct ConserveArgs {
    /// Linear downsampling factor
    #[arg(long)]
    factor: Option<usize>,

    /// Output integer type: int16 or int32
    #[arg(long)]
    output_type: Option<String>,

    /// Output no-data value
    #[arg(long, allow_hyphen_values = true)]
    output_nodata: Option<i32>,

    /// Rounding threshold estimator: linear, lower, higher, nearest, midpoint
    #[arg(long)]
    quantile_method: Option<String>,

    /// Empty input handling: error or nodata
    #[arg(long)]
    empty_grid: Option<String>,
}

impl ConserveArgs {
    fn apply(&self, config: &mut ConserveConfig) -> Result<()> {
        if let Some(factor) = self.factor {
            config.downsample_factor = factor;
        }
        if let Some(name) = &self.output_type {
            config.output_type = IntDataType::from_str(name)
                .with_context(|| format!("unknown output type '{}'", name))?;
        }
        if let Some(nodata) = self.output_nodata {
            config.output_nodata = nodata;
        }
        if let Some(method) = &self.quantile_method {
            config.quantile_method = QuantileMethod::from_str(method);
        }
        if let Some(policy) = &self.empty_grid {
            config.empty_grid = EmptyGridPolicy::from_str(policy);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Resample {
            input,
            output,
            conserve,
        } => {
            let mut config = ConserveConfig::from_env();
            conserve.apply(&mut config)?;
            let conserver = RasterConserver::new(config)?;

            let output = output.unwrap_or_else(|| input.clone());
            let report = conserve_file(&input, &output, &conserver)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Inspect { path } => {
            let grid = read_grid(&path)?;
            let info = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| RasterFileInfo::parse(n).ok());

            let summary = json!({
                "path": path.display().to_string(),
                "width": grid.width,
                "height": grid.height,
                "nodata": grid.nodata,
                "valid_cells": grid.valid_count(),
                "total": grid.valid_sum(),
                "transform": grid.transform.to_gdal(),
                "epsg": grid.projection.epsg(),
                "metadata": info,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Run {
            target,
            source_dir,
            work_dir,
            force,
            no_database,
            conserve,
        } => {
            let mut config = load_config(target.config.as_ref())?;
            config.country = target.country.clone();
            config.year = target.year;
            if source_dir.is_some() {
                config.source_dir = source_dir;
            }
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            config.force |= force;
            if no_database {
                config.databases.clear();
            }
            conserve.apply(&mut config.conserve)?;
            config.validate()?;

            info!(
                country = %config.country,
                year = config.year,
                databases = config.databases.len(),
                "Starting pipeline run"
            );
            let pipeline = Pipeline::connect(config).await?;
            let summary = pipeline.run(&target.country, target.year).await?;
            report(&summary)?;
        }

        Commands::Upload { dir, force, config } => {
            let mut config = load_config(config.as_ref())?;
            config.force |= force;
            config.databases.clear();

            let pipeline = Pipeline::connect(config).await?;
            let summary = pipeline.upload_dir(&dir).await?;
            report(&summary)?;
        }

        Commands::Insert { target } => {
            let mut config = load_config(target.config.as_ref())?;
            config.country = target.country.clone();
            config.year = target.year;
            config.validate()?;
            if config.databases.is_empty() {
                bail!("no database configured; set DATABASE_URL or DEV_DATABASE_URL");
            }

            let pipeline = Pipeline::connect(config).await?;
            let summary = pipeline
                .insert_from_storage(&target.country, target.year)
                .await?;
            report(&summary)?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        "json" => tracing::subscriber::set_global_default(builder.json().finish())?,
        _ => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

/// YAML file when given, otherwise the environment.
fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_yaml(path)?),
        None => Ok(PipelineConfig::from_env()),
    }
}

/// Print the summary and fail the process if any raster failed.
fn report(summary: &PipelineSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    if !summary.is_success() {
        bail!("{} raster(s) failed", summary.failed);
    }
    Ok(())
}
