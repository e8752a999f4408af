//! Error types for the raster crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving a source locator to a local raster file.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The source could not be downloaded or does not exist locally.
    #[error("Failed to fetch {locator}: {reason}")]
    Fetch {
        /// Source locator as given by the caller.
        locator: String,
        /// Reason for failure.
        reason: String,
    },

    /// The archive could not be extracted or holds no raster file.
    #[error("Archive error for {}: {reason}", path.display())]
    Archive {
        /// Path of the cached archive.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn fetch(locator: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::Fetch {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        CacheError::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while decoding or thresholding a raster.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The file is not a usable georeferenced raster.
    #[error("Unreadable raster {}: {reason}", path.display())]
    Unreadable {
        /// Path of the raster file.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Threshold bounds are inverted or not numbers.
    #[error("Invalid mask range: min {min} must not exceed max {max}")]
    InvalidRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Sample buffer length does not match the grid dimensions.
    #[error("Grid of {width}x{height} expects {expected} samples, got {actual}")]
    DimensionMismatch {
        /// Grid width in cells.
        width: usize,
        /// Grid height in cells.
        height: usize,
        /// Expected number of samples.
        expected: usize,
        /// Actual number of samples.
        actual: usize,
    },
}

impl RasterError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RasterError::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
