//! Error types for the vector crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while clipping and writing vector output.
#[derive(Debug, Error)]
pub enum VectorError {
    /// The boundary source could not be read or holds no polygons.
    #[error("Failed to load boundary {origin}: {reason}")]
    GeometryLoad {
        /// Path or name of the boundary source.
        origin: String,
        /// Reason for failure.
        reason: String,
    },

    /// No transformation exists between two reference systems.
    #[error("Cannot reproject EPSG:{from} to EPSG:{to}: {reason}")]
    Reprojection {
        /// Source EPSG code.
        from: u16,
        /// Target EPSG code.
        to: u16,
        /// Reason for failure.
        reason: String,
    },

    /// The output file could not be written.
    #[error("Failed to write {}: {reason}", path.display())]
    Write {
        /// Output path.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },
}

impl VectorError {
    pub(crate) fn geometry_load(origin: impl ToString, reason: impl ToString) -> Self {
        VectorError::GeometryLoad {
            origin: origin.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn reprojection(from: u16, to: u16, reason: impl ToString) -> Self {
        VectorError::Reprojection {
            from,
            to,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VectorError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
