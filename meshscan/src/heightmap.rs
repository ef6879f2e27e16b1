//! Normalised bed height map.

use std::fmt;

use crate::error::{Error, Result};
use crate::grid::{GridSpec, ScanResult};

/// Bed deviation per cell, in millimetres, with the lowest cell at 0.0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeightMap {
    grid: GridSpec,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    defaulted: Vec<(usize, usize)>,
}

impl HeightMap {
    /// Geometry of the scan.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Height at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.values[row * self.cols + col])
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values
            .chunks(self.cols.max(1))
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Highest point relative to the lowest; the peak-to-valley flatness.
    pub fn range(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Cells holding a default in either input pass.
    pub fn defaulted_cells(&self) -> &[(usize, usize)] {
        &self.defaulted
    }

    /// Whether the cell holds a default in either input pass.
    pub fn is_defaulted(&self, row: usize, col: usize) -> bool {
        self.defaulted
            .contains(&(row, col))
    }
}

impl fmt::Display for HeightMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, row) in self
            .rows()
            .enumerate()
        {
            for (c, value) in row
                .iter()
                .enumerate()
            {
                if c > 0 {
                    write!(f, " ")?;
                }
                let mark = if self.is_defaulted(r, c) { '*' } else { ' ' };
                write!(f, "{value:7.3}{mark}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Combines scan passes into a [`HeightMap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeightMapBuilder;

impl HeightMapBuilder {
    /// Build a height map from a raw pass and an optional compensation pass.
    ///
    /// The offset is subtracted cell by cell, then the minimum of the result
    /// is subtracted from every cell.
    pub fn build(raw: &ScanResult, offset: Option<&ScanResult>) -> Result<HeightMap> {
        let (rows, cols) = raw.shape();
        if !raw.is_complete() {
            return Err(Error::Config(format!(
                "raw scan is incomplete ({} of {} cells)",
                raw.values().len(),
                rows * cols
            )));
        }

        let mut values = raw
            .values()
            .to_vec();
        let mut defaulted = raw.defaulted_cells();

        if let Some(offset) = offset {
            if offset.shape() != raw.shape() {
                return Err(Error::ShapeMismatch {
                    expected: raw.shape(),
                    actual: offset.shape(),
                });
            }
            if !offset.is_complete() {
                return Err(Error::Config(format!(
                    "offset scan is incomplete ({} of {} cells)",
                    offset.values().len(),
                    rows * cols
                )));
            }
            for (value, compensation) in values
                .iter_mut()
                .zip(offset.values())
            {
                *value -= compensation;
            }
            for cell in offset.defaulted_cells() {
                if !defaulted.contains(&cell) {
                    defaulted.push(cell);
                }
            }
            defaulted.sort_unstable();
        }

        let floor = values
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        if floor.is_finite() {
            for value in &mut values {
                *value -= floor;
            }
        }

        Ok(HeightMap {
            grid: *raw.grid(),
            rows,
            cols,
            values,
            defaulted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::grid::CellStatus;

    fn grid2() -> GridSpec {
        GridSpec::new(50.0, 50.0, 25.0)
    }

    #[test]
    fn test_min_is_zero() {
        let raw = ScanResult::from_values(grid2(), vec![0.3, 0.1, 0.5, 0.2]).unwrap();
        let map = HeightMapBuilder::build(&raw, None).unwrap();

        assert_eq!(map.shape(), (2, 2));
        let min = map
            .values()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(min, 0.0);
        assert!((map.get(1, 0).unwrap() - 0.4).abs() < 1e-12);
        assert!((map.range() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_offset_subtracted_before_normalising() {
        let raw = ScanResult::from_values(grid2(), vec![1.0, 1.2, 1.1, 1.3]).unwrap();
        let offset = ScanResult::from_values(grid2(), vec![0.0, 0.2, 0.1, 0.3]).unwrap();
        let map = HeightMapBuilder::build(&raw, Some(&offset)).unwrap();
        for value in map.values() {
            assert!(value.abs() < 1e-12);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let raw = ScanResult::from_values(GridSpec::new(75.0, 75.0, 25.0), vec![0.0; 9]).unwrap();
        let offset = ScanResult::from_values(grid2(), vec![0.0; 4]).unwrap();
        let err = HeightMapBuilder::build(&raw, Some(&offset)).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: (3, 3),
                actual: (2, 2)
            }
        ));
    }

    #[test]
    fn test_incomplete_offset_rejected() {
        let raw = ScanResult::from_values(grid2(), vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let offset = ScanResult::new(grid2());
        let err = HeightMapBuilder::build(&raw, Some(&offset)).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("offset")));
    }

    #[test]
    fn test_incomplete_raw_rejected() {
        let raw = ScanResult::new(grid2());
        assert!(HeightMapBuilder::build(&raw, None).is_err());
    }

    #[test]
    fn test_defaulted_cells_union() {
        let mut raw = ScanResult::new(grid2());
        raw.record(0.1, CellStatus::Measured);
        raw.record(0.0, CellStatus::Assumed);
        raw.record(0.2, CellStatus::Measured);
        raw.record(0.3, CellStatus::Measured);

        let mut offset = ScanResult::new(grid2());
        offset.record(0.0, CellStatus::Measured);
        offset.record(0.0, CellStatus::Faulted(ParseError::MarkerNotFound("Z:")));
        offset.record(0.0, CellStatus::Measured);
        offset.record(0.0, CellStatus::Faulted(ParseError::MarkerNotFound("Z:")));

        let map = HeightMapBuilder::build(&raw, Some(&offset)).unwrap();
        assert_eq!(map.defaulted_cells(), &[(0, 1), (1, 1)]);
        assert!(map.is_defaulted(1, 1));
        assert!(!map.is_defaulted(1, 0));
    }

    #[test]
    fn test_skipped_offset_leaves_raw_untouched() {
        let raw = ScanResult::from_values(grid2(), vec![0.4, 0.2, 0.6, 0.3]).unwrap();
        let mut offset = ScanResult::new(grid2());
        for _ in 0..4 {
            offset.record(0.0, CellStatus::Skipped);
        }
        let with = HeightMapBuilder::build(&raw, Some(&offset)).unwrap();
        let without = HeightMapBuilder::build(&raw, None).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_display_marks_defaulted() {
        let mut raw = ScanResult::new(GridSpec::new(25.0, 50.0, 25.0));
        raw.record(0.5, CellStatus::Measured);
        raw.record(0.0, CellStatus::Assumed);
        let text = HeightMapBuilder::build(&raw, None)
            .unwrap()
            .to_string();
        assert_eq!(text, "  0.500    0.000*\n");
    }
}
