//! Scan geometry and measured grids.
//!
//! Grids are stored row-major with x as the outer (row) axis and y as the
//! inner (column) axis, which is also the order in which cells are probed.

use std::fmt;

use crate::error::{Error, ParseError, Result};

/// Largest grid a scan accepts.
pub const MAX_CELLS: usize = 10_000;

/// Absolute machine coordinates in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Rectangular probing area divided into square cells.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridSpec {
    /// Extent along X in millimetres.
    pub x_extent: f64,
    /// Extent along Y in millimetres.
    pub y_extent: f64,
    /// Cell edge length in millimetres.
    pub spacing: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            x_extent: 150.0,
            y_extent: 150.0,
            spacing: 25.0,
        }
    }
}

impl GridSpec {
    /// Create a grid specification.
    pub fn new(x_extent: f64, y_extent: f64, spacing: f64) -> Self {
        Self {
            x_extent,
            y_extent,
            spacing,
        }
    }

    /// Check that the grid describes at least one cell.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("x extent", self.x_extent),
            ("y extent", self.y_extent),
            ("spacing", self.spacing),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.spacing > self.x_extent.min(self.y_extent) {
            return Err(Error::Config(format!(
                "spacing {} exceeds the smaller extent {}",
                self.spacing,
                self.x_extent.min(self.y_extent)
            )));
        }
        let rows = (self.x_extent / self.spacing).ceil();
        let cols = (self.y_extent / self.spacing).ceil();
        #[allow(clippy::cast_precision_loss)]
        let limit = MAX_CELLS as f64;
        if rows * cols > limit {
            return Err(Error::Config(format!(
                "grid of {rows}x{cols} cells exceeds the limit of {MAX_CELLS}"
            )));
        }
        Ok(())
    }

    /// Number of rows (cells along X).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rows(&self) -> usize {
        (self.x_extent / self.spacing).ceil() as usize
    }

    /// Number of columns (cells along Y).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cols(&self) -> usize {
        (self.y_extent / self.spacing).ceil() as usize
    }

    /// Grid shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// Total number of cells; saturates for grids that fail `validate`.
    pub fn cell_count(&self) -> usize {
        self.rows()
            .saturating_mul(self.cols())
    }

    /// Probe target of cell (`row`, `col`) at height `z`.
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, row: usize, col: usize, z: f64) -> Position {
        let half = self.spacing / 2.0;
        Position::new(
            row as f64 * self.spacing + half,
            col as f64 * self.spacing + half,
            z,
        )
    }

    /// Corner-to-corner distance of the whole grid.
    pub fn diagonal(&self) -> f64 {
        self.x_extent
            .hypot(self.y_extent)
    }

    /// Distance travelled when wrapping from the end of one row to the start
    /// of the next.
    pub fn row_return_distance(&self) -> f64 {
        self.spacing
            .hypot(self.y_extent)
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} mm @ {} mm ({}x{} cells)",
            self.x_extent,
            self.y_extent,
            self.spacing,
            self.rows(),
            self.cols()
        )
    }
}

/// Quality of a single recorded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellStatus {
    /// Value was read from the firmware.
    Measured,
    /// Firmware gave a known-degenerate reply; the value is a sentinel.
    Assumed,
    /// Reply could not be decoded; the value is the 0.0 default.
    Faulted(ParseError),
    /// Measurement disabled by configuration; no command was sent.
    Skipped,
}

impl CellStatus {
    /// Whether the cell holds a default instead of a reading.
    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Assumed | Self::Faulted(_))
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured => write!(f, "measured"),
            Self::Assumed => write!(f, "assumed"),
            Self::Faulted(e) => write!(f, "faulted ({e})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Values recorded by one pass over a grid, in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    grid: GridSpec,
    values: Vec<f64>,
    status: Vec<CellStatus>,
}

impl ScanResult {
    /// Start an empty result for `grid`.
    pub fn new(grid: GridSpec) -> Self {
        let cells = grid
            .cell_count()
            .min(MAX_CELLS);
        Self {
            grid,
            values: Vec::with_capacity(cells),
            status: Vec::with_capacity(cells),
        }
    }

    /// Build a fully populated, all-measured result from row-major values.
    pub fn from_values(grid: GridSpec, values: Vec<f64>) -> Result<Self> {
        if values.len() != grid.cell_count() {
            return Err(Error::Config(format!(
                "{} values do not fill a {}x{} grid",
                values.len(),
                grid.rows(),
                grid.cols()
            )));
        }
        let status = vec![CellStatus::Measured; values.len()];
        Ok(Self {
            grid,
            values,
            status,
        })
    }

    /// Append the next cell in scan order.
    pub(crate) fn record(&mut self, value: f64, status: CellStatus) {
        self.values.push(value);
        self.status.push(status);
    }

    /// Geometry the result was scanned with.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    /// Whether every cell has been recorded.
    pub fn is_complete(&self) -> bool {
        self.values.len() == self.grid.cell_count()
    }

    /// Value at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.index(row, col)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Status at (`row`, `col`).
    pub fn status(&self, row: usize, col: usize) -> Option<&CellStatus> {
        self.index(row, col)
            .and_then(|i| self.status.get(i))
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Row-major statuses.
    pub fn statuses(&self) -> &[CellStatus] {
        &self.status
    }

    /// Coordinates of every cell holding a default instead of a reading.
    pub fn defaulted_cells(&self) -> Vec<(usize, usize)> {
        let cols = self.grid.cols();
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_defaulted())
            .map(|(i, _)| (i / cols, i % cols))
            .collect()
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        let (rows, cols) = self.shape();
        (row < rows && col < cols).then_some(row * cols + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_rounds_up() {
        assert_eq!(GridSpec::new(150.0, 150.0, 25.0).shape(), (6, 6));
        assert_eq!(GridSpec::new(100.0, 60.0, 25.0).shape(), (4, 3));
        assert_eq!(GridSpec::new(10.0, 10.0, 10.0).shape(), (1, 1));
        assert_eq!(GridSpec::new(200.0, 180.0, 30.0).shape(), (7, 6));
    }

    #[test]
    fn test_validate_rejects_bad_spacing() {
        assert!(GridSpec::new(150.0, 150.0, 0.0).validate().is_err());
        assert!(GridSpec::new(150.0, 150.0, -5.0).validate().is_err());
        assert!(GridSpec::new(150.0, 20.0, 25.0).validate().is_err());
        assert!(GridSpec::new(f64::NAN, 20.0, 5.0).validate().is_err());
        assert!(GridSpec::new(150.0, 150.0, 25.0).validate().is_ok());
        assert!(GridSpec::new(25.0, 25.0, 25.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_grid() {
        let huge = GridSpec::new(1e12, 1e12, 1.0);
        assert!(matches!(huge.validate(), Err(Error::Config(_))));
        assert_eq!(huge.cell_count(), usize::MAX);

        assert!(GridSpec::new(100.0, 100.0, 1.0).validate().is_ok());
        assert!(GridSpec::new(101.0, 100.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_cell_center_offset() {
        let grid = GridSpec::new(150.0, 150.0, 25.0);
        assert_eq!(grid.cell_center(0, 0, 5.0), Position::new(12.5, 12.5, 5.0));
        assert_eq!(grid.cell_center(2, 1, 5.0), Position::new(62.5, 37.5, 5.0));
    }

    #[test]
    fn test_row_return_exceeds_spacing() {
        let grid = GridSpec::new(150.0, 100.0, 25.0);
        assert!(grid.row_return_distance() > grid.spacing);
        assert!(grid.diagonal() > grid.row_return_distance());
    }

    #[test]
    fn test_scan_result_indexing_and_defaults() {
        let grid = GridSpec::new(50.0, 50.0, 25.0);
        let mut result = ScanResult::new(grid);
        result.record(0.1, CellStatus::Measured);
        result.record(0.0, CellStatus::Faulted(ParseError::MarkerNotFound("Z:")));
        result.record(0.0, CellStatus::Assumed);
        result.record(0.0, CellStatus::Skipped);

        assert!(result.is_complete());
        assert_eq!(result.get(0, 0), Some(0.1));
        assert_eq!(result.get(2, 0), None);
        assert_eq!(result.status(1, 1), Some(&CellStatus::Skipped));
        assert_eq!(result.defaulted_cells(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_from_values_checks_length() {
        let grid = GridSpec::new(50.0, 50.0, 25.0);
        assert!(ScanResult::from_values(grid, vec![0.0; 3]).is_err());
        let result = ScanResult::from_values(grid, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(result.get(1, 0), Some(3.0));
        assert!(result.defaulted_cells().is_empty());
    }
}
