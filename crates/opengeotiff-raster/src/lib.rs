//! # opengeotiff-raster
//!
//! Raster side of the opengeotiff pipeline: getting a GeoTIFF onto local
//! disk, decoding its first band, and thresholding it into a boolean mask.
//!
//! ## Overview
//!
//! - [`RasterCache`] resolves a [`SourceLocator`] (URL or path) to a local
//!   raster file. Remote files are downloaded once into the cache directory;
//!   ZIP archives are extracted and the raster inside is located by
//!   extension.
//! - [`read_raster`] decodes a GeoTIFF into a [`RasterGrid`]: samples of the
//!   first band widened to `f64`, the affine [`GeoTransform`], the EPSG code
//!   and the optional no-data sentinel.
//! - [`threshold_mask`] builds a [`MaskGrid`] selecting the cells whose value
//!   lies in an inclusive `[min, max]` range.
//!
//! ## Example
//!
//! ```no_run
//! use opengeotiff_raster::{read_raster, threshold_mask, RasterCache, SourceLocator};
//!
//! let cache = RasterCache::new("./cache")?;
//! let locator = SourceLocator::parse("https://example.com/atlas.zip#GHI.tif");
//! let path = cache.resolve(&locator)?;
//!
//! let grid = read_raster(&path)?;
//! let mask = threshold_mask(&grid, 0.0, 1000.0)?;
//! println!("{} cells selected", mask.count_true());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod grid;
mod mask;
mod reader;

pub use cache::{cache_file_name, select_raster, CacheResult, RasterCache, SourceLocator};
pub use error::{CacheError, RasterError};
pub use grid::{GeoTransform, RasterGrid};
pub use mask::{threshold_mask, validate_range, MaskGrid};
pub use reader::read_raster;

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
