//! Sequential driver for one configured run.
//!
//! Stages run strictly in order and every error is fatal:
//!
//! ```text
//! Idle -> Fetching -> Reading -> Masking -> Polygonizing -> Clipping -> Writing -> Done
//!                                   (any stage) -> Failed
//! ```

use crate::config::PipelineConfig;
use opengeotiff_raster::{
    read_raster, threshold_mask, validate_range, CacheError, RasterCache, RasterError,
    SourceLocator,
};
use opengeotiff_vector::{
    clip, polygonize, simplify_features, write_features, Boundary, FeatureAttributes,
    VectorError,
};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

/// Pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Reading,
    Masking,
    Polygonizing,
    Clipping,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::Fetching => "Fetching",
            Stage::Reading => "Reading",
            Stage::Masking => "Masking",
            Stage::Polygonizing => "Polygonizing",
            Stage::Clipping => "Clipping",
            Stage::Writing => "Writing",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Failure category reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Archive,
    UnreadableRaster,
    InvalidRange,
    GeometryLoad,
    Reprojection,
    Write,
}

impl ErrorKind {
    /// Stable name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Fetch => "FetchError",
            ErrorKind::Archive => "ArchiveError",
            ErrorKind::UnreadableRaster => "UnreadableRasterError",
            ErrorKind::InvalidRange => "InvalidRangeError",
            ErrorKind::GeometryLoad => "GeometryLoadError",
            ErrorKind::Reprojection => "ReprojectionError",
            ErrorKind::Write => "WriteError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error raised by one of the library stages.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Vector(#[from] VectorError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Cache(CacheError::Fetch { .. }) => ErrorKind::Fetch,
            StageError::Cache(CacheError::Archive { .. }) => ErrorKind::Archive,
            StageError::Raster(RasterError::Unreadable { .. })
            | StageError::Raster(RasterError::DimensionMismatch { .. }) => {
                ErrorKind::UnreadableRaster
            }
            StageError::Raster(RasterError::InvalidRange { .. }) => ErrorKind::InvalidRange,
            StageError::Vector(VectorError::GeometryLoad { .. }) => ErrorKind::GeometryLoad,
            StageError::Vector(VectorError::Reprojection { .. }) => ErrorKind::Reprojection,
            StageError::Vector(VectorError::Write { .. }) => ErrorKind::Write,
        }
    }
}

/// A failed run: the stage that failed and why.
#[derive(Debug, Error)]
#[error("{stage} failed with {}: {source}", source.kind())]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Tag errors from `stage` for `map_err`.
fn at<E: Into<StageError>>(stage: Stage) -> impl FnOnce(E) -> PipelineError {
    move |e| PipelineError {
        stage,
        source: e.into(),
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Local raster file that was processed.
    pub raster: PathBuf,
    /// EPSG code of the output coordinates.
    pub epsg: u16,
    /// Mask cells inside the range.
    pub masked_cells: usize,
    /// Polygons before clipping.
    pub polygon_count: usize,
    /// Features written.
    pub feature_count: usize,
    /// Output file.
    pub output: PathBuf,
}

/// One configured run of the raster-to-vector pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    stage: Stage,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stage: Stage::Idle,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current stage; `Done` or `Failed` once [`run`](Self::run) returns.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage to completion.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        match self.execute() {
            Ok(summary) => {
                self.stage = Stage::Done;
                info!(
                    "Done: {} feature(s) written to {}",
                    summary.feature_count,
                    summary.output.display()
                );
                Ok(summary)
            }
            Err(e) => {
                self.stage = Stage::Failed;
                error!("Pipeline failed at {}: {}", e.stage, e.source);
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn execute(&mut self) -> Result<RunSummary, PipelineError> {
        let config = self.config.clone();
        let (min, max) = (config.mask.min, config.mask.max);

        // An unusable range fails the run before any download starts
        validate_range(min, max).map_err(at(Stage::Masking))?;

        self.enter(Stage::Fetching);
        let cache = RasterCache::new(&config.cache_dir).map_err(at(Stage::Fetching))?;
        let source = SourceLocator::parse(&config.source);
        let raster = cache.resolve(&source).map_err(at(Stage::Fetching))?;
        info!("Raster source resolved to {}", raster.display());

        self.enter(Stage::Reading);
        let grid = read_raster(&raster).map_err(at(Stage::Reading))?;
        info!(
            "Read {}x{} raster in EPSG:{}",
            grid.width(),
            grid.height(),
            grid.epsg()
        );

        self.enter(Stage::Masking);
        let mask = threshold_mask(&grid, min, max).map_err(at(Stage::Masking))?;
        let masked_cells = mask.count_true();
        info!("{} of {} cells within [{}, {}]", masked_cells, grid.data().len(), min, max);

        self.enter(Stage::Polygonizing);
        let epsg = grid.epsg();
        let polygons = polygonize(&mask, grid.transform(), epsg);
        let polygon_count = polygons.len();
        info!("Polygonized mask into {} region(s)", polygon_count);
        drop(mask);
        drop(grid);

        self.enter(Stage::Clipping);
        let clipping = SourceLocator::parse(&config.clipping);
        let boundary_path = if clipping.is_remote() {
            cache.fetch(&clipping).map_err(at(Stage::Clipping))?
        } else {
            PathBuf::from(&config.clipping)
        };
        let boundary = Boundary::load(&boundary_path).map_err(at(Stage::Clipping))?;
        let attributes = FeatureAttributes {
            min,
            max,
            source: config.source.clone(),
        };
        let mut features = clip(polygons, &boundary, &attributes).map_err(at(Stage::Clipping))?;
        if let Some(tolerance) = config.simplify.filter(|t| *t > 0.0) {
            features = simplify_features(features, tolerance);
        }
        info!("{} feature(s) inside the boundary", features.len());

        self.enter(Stage::Writing);
        write_features(&features, epsg, &config.output).map_err(at(Stage::Writing))?;

        Ok(RunSummary {
            raster,
            epsg,
            masked_cells,
            polygon_count,
            feature_count: features.len(),
            output: config.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::Fetch.name(), "FetchError");
        assert_eq!(ErrorKind::UnreadableRaster.to_string(), "UnreadableRasterError");
        assert_eq!(ErrorKind::Write.name(), "WriteError");
    }

    #[test]
    fn test_dimension_mismatch_counts_as_unreadable() {
        let e = StageError::from(RasterError::DimensionMismatch {
            width: 2,
            height: 2,
            expected: 4,
            actual: 3,
        });
        assert_eq!(e.kind(), ErrorKind::UnreadableRaster);
    }

    #[test]
    fn test_error_message_names_stage_and_kind() {
        let err = at::<RasterError>(Stage::Masking)(RasterError::InvalidRange {
            min: 5.0,
            max: 1.0,
        });
        let message = err.to_string();
        assert!(message.starts_with("Masking failed with InvalidRangeError"), "{}", message);
    }

    #[test]
    fn test_new_pipeline_is_idle() {
        let config = "source: a.tif\ncache_dir: c\nclipping: b.geojson\noutput: o.geojson\nmask: {min: 0, max: 1}\n"
            .parse()
            .unwrap();
        assert_eq!(Pipeline::new(config).stage(), Stage::Idle);
    }
}
