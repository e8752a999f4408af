//! Pipeline configuration.
//!
//! ```yaml
//! source: "https://example.com/atlas.zip#GHI.tif"
//! cache_dir: ./cache
//! clipping: ./region.geojson
//! output: ./ghi_low.geojson
//! mask:
//!   min: 0
//!   max: 1000
//! simplify: 0.005   # optional
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Inclusive value range selected by the mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaskRange {
    pub min: f64,
    pub max: f64,
}

/// Parameters of one pipeline run.
///
/// Range order is checked by the pipeline, which reports an inverted range
/// as an invalid-range failure before anything is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Raster locator: local path or `http(s)` URL, optionally with a
    /// `#member` fragment selecting a file inside an archive.
    pub source: String,
    /// Directory for downloaded and extracted files.
    pub cache_dir: PathBuf,
    /// Boundary locator: local GeoJSON path or `http(s)` URL.
    pub clipping: String,
    /// Output path; `.geojson`/`.json` or `.gpkg` selects the format.
    pub output: PathBuf,
    /// Mask bounds.
    pub mask: MaskRange,
    /// Simplification tolerance in output units; off when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplify: Option<f64>,
}

impl PipelineConfig {
    /// Load and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Check the fields serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source must not be empty".into()));
        }
        if self.clipping.trim().is_empty() {
            return Err(ConfigError::Invalid("clipping must not be empty".into()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache_dir must not be empty".into()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output must not be empty".into()));
        }
        if let Some(tolerance) = self.simplify {
            if !(tolerance >= 0.0 && tolerance.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "simplify must be a non-negative number, got {}",
                    tolerance
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for PipelineConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: PipelineConfig = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
