//! Threshold masking of a raster grid.

use crate::{RasterError, RasterGrid, Result};
use tracing::debug;

/// Boolean grid with the same shape as its source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskGrid {
    cells: Vec<bool>,
    width: usize,
    height: usize,
    true_count: usize,
}

impl MaskGrid {
    /// Build a mask from row-major cells.
    pub fn new(width: usize, height: usize, cells: Vec<bool>) -> Result<Self> {
        let expected = width * height;
        if cells.len() != expected {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }
        let true_count = cells.iter().filter(|&&c| c).count();
        Ok(Self {
            cells,
            width,
            height,
            true_count,
        })
    }

    /// Build a mask from rows of equal length.
    ///
    /// # Panics
    /// Panics if the rows have different lengths.
    pub fn from_rows(rows: &[&[bool]]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        assert!(
            rows.iter().all(|r| r.len() == width),
            "mask rows must have equal length"
        );
        let cells: Vec<bool> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let true_count = cells.iter().filter(|&&c| c).count();
        Self {
            cells,
            width,
            height: rows.len(),
            true_count,
        }
    }

    /// Width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell at `(row, col)`. Anything outside the grid reads as `false`.
    pub fn get(&self, row: isize, col: isize) -> bool {
        if row < 0 || col < 0 {
            return false;
        }
        let (row, col) = (row as usize, col as usize);
        row < self.height && col < self.width && self.cells[row * self.width + col]
    }

    /// Row-major cells.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Number of `true` cells.
    pub fn count_true(&self) -> usize {
        self.true_count
    }
}

/// Check that `[min, max]` is a usable inclusive range.
pub fn validate_range(min: f64, max: f64) -> Result<()> {
    // NaN fails both comparisons, so test the accepted case.
    if min <= max {
        Ok(())
    } else {
        Err(RasterError::InvalidRange { min, max })
    }
}

/// Mark every cell whose sample lies in the inclusive range `[min, max]`.
///
/// No-data samples and NaN samples are never selected.
pub fn threshold_mask(grid: &RasterGrid, min: f64, max: f64) -> Result<MaskGrid> {
    validate_range(min, max)?;

    let cells: Vec<bool> = grid
        .data()
        .iter()
        .map(|&v| !grid.is_no_data(v) && v >= min && v <= max)
        .collect();
    let true_count = cells.iter().filter(|&&c| c).count();

    debug!(
        "Mask [{}, {}] selected {} of {} cells",
        min,
        max,
        true_count,
        cells.len()
    );

    Ok(MaskGrid {
        cells,
        width: grid.width(),
        height: grid.height(),
        true_count,
    })
}
