//! In-memory raster grid and its affine georeferencing.

use crate::{RasterError, Result};

/// Affine mapping from pixel space to real-world coordinates.
///
/// Coefficients follow the GDAL ordering:
/// `x = c[0] + col * c[1] + row * c[2]` and `y = c[3] + col * c[4] + row * c[5]`,
/// where `(col, row)` address pixel corners (so `(0, 0)` is the outer corner
/// of the first pixel, not its center).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Create a transform from its six coefficients.
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// Create an axis-aligned transform.
    ///
    /// `pixel_height` is usually negative for north-up rasters.
    pub fn from_origin(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, pixel_height])
    }

    /// The raw coefficients.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Map a pixel-corner position to world coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Real-world area covered by one pixel.
    pub fn pixel_area(&self) -> f64 {
        let c = &self.0;
        (c[1] * c[5] - c[2] * c[4]).abs()
    }
}

/// A single band of scalar samples with its georeferencing.
///
/// Georeferencing is fixed at construction; there are no setters.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    /// Samples in row-major order, row 0 first.
    data: Vec<f64>,
    width: usize,
    height: usize,
    no_data: Option<f64>,
    epsg: u16,
    transform: GeoTransform,
}

impl RasterGrid {
    /// Build a grid from row-major samples.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f64>,
        no_data: Option<f64>,
        epsg: u16,
        transform: GeoTransform,
    ) -> Result<Self> {
        let expected = width * height;
        if data.len() != expected {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            no_data,
            epsg,
            transform,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major samples.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Sample at `(row, col)`, or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    /// Declared no-data sentinel.
    pub fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    /// Whether `value` matches the no-data sentinel.
    ///
    /// A NaN sentinel matches every NaN sample.
    pub fn is_no_data(&self, value: f64) -> bool {
        match self.no_data {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) => value == nd,
            None => false,
        }
    }

    /// EPSG code of the spatial reference.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// Pixel-to-world transform.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }
}
