//! # opengeotiff-runner
//!
//! Loads a YAML [`PipelineConfig`] and drives the raster-to-vector
//! [`Pipeline`]: fetch, read, mask, polygonize, clip, write.
//!
//! ```no_run
//! use opengeotiff_runner::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_file("config.yml")?;
//! let summary = Pipeline::new(config).run()?;
//! println!("{} features -> {}", summary.feature_count, summary.output.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod pipeline;

pub use config::{ConfigError, MaskRange, PipelineConfig};
pub use pipeline::{ErrorKind, Pipeline, PipelineError, RunSummary, Stage, StageError};
