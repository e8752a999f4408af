//! # opengeotiff-vector
//!
//! Vector side of the opengeotiff pipeline.
//!
//! - [`polygonize`] turns a [`MaskGrid`](opengeotiff_raster::MaskGrid) into
//!   one polygon per connected region, with vertices on pixel corners.
//! - [`Boundary`] loads the clipping area from GeoJSON and can be moved into
//!   another reference system through a [`Reprojector`].
//! - [`clip`] intersects mask polygons with the boundary.
//! - [`write_features`] stores the result as a GeoJSON FeatureCollection or
//!   a GeoPackage layer, chosen by [`OutputFormat`].
//!
//! ## Example
//!
//! ```no_run
//! use opengeotiff_raster::{read_raster, threshold_mask};
//! use opengeotiff_vector::{clip, polygonize, write_features, Boundary, FeatureAttributes};
//!
//! let grid = read_raster("GHI.tif")?;
//! let mask = threshold_mask(&grid, 0.0, 1000.0)?;
//! let polygons = polygonize(&mask, grid.transform(), grid.epsg());
//!
//! let boundary = Boundary::load("region.geojson")?;
//! let attributes = FeatureAttributes { min: 0.0, max: 1000.0, source: "GHI.tif".into() };
//! let features = clip(polygons, &boundary, &attributes)?;
//! write_features(&features, grid.epsg(), "out.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod boundary;
mod clip;
mod error;
mod gpkg;
mod polygonize;
mod reproject;
mod writer;

pub use boundary::{parse_crs_name, Boundary, DEFAULT_EPSG};
pub use clip::{clip, simplify_features, ClippedFeature, FeatureAttributes, AREA_TOLERANCE};
pub use error::VectorError;
pub use polygonize::{polygonize, polygonize_with, Connectivity, MaskPolygon, PolygonSet};
pub use reproject::{is_geographic, proj_string, Reprojector};
pub use writer::{is_supported_output, write_features, OutputFormat};

/// Result type for vector operations.
pub type Result<T> = std::result::Result<T, VectorError>;
