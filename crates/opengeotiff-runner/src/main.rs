//! opengeotiff CLI: turn a thresholded GeoTIFF into clipped vector polygons.

use clap::Parser;
use opengeotiff_runner::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_PIPELINE_FAILED: u8 = 1;
const EXIT_BAD_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "opengeotiff")]
#[command(version, about = "Mask a GeoTIFF by value range and export the regions as clipped polygons")]
struct Cli {
    /// YAML configuration file
    config: PathBuf,

    /// Log debug details (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_target(false).init();

    if !cli.config.is_file() {
        eprintln!("Error: config file not found at {}", cli.config.display());
        return ExitCode::from(EXIT_BAD_CONFIG);
    }

    let config = match PipelineConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };
    info!("Loaded configuration from {}", cli.config.display());

    match Pipeline::new(config).run() {
        Ok(summary) => {
            println!(
                "{} feature(s) written to {}",
                summary.feature_count,
                summary.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error [{}] at {}: {}", e.kind(), e.stage, e.source);
            ExitCode::from(EXIT_PIPELINE_FAILED)
        }
    }
}
