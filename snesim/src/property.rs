use crate::error::{Error, Result};
use crate::grid::{GridStructure, SpatialIndex};

/// Dense buffer of optional categorical values over a grid.
///
/// Missing entries are held as NaN internally and never leak through the
/// API; `get` returns `None` for them. The missing-entry count is kept
/// consistent under every cellwise mutation. Buffers are created all-missing
/// and never resized.
#[derive(Debug, Clone)]
pub struct Property {
    grid: GridStructure,
    values: Vec<f32>,
    missing_count: usize,
}

impl Property {
    /// Create an all-missing property over `grid`.
    pub fn new(grid: GridStructure) -> Self {
        let n = grid.cell_count();
        Self {
            grid,
            values: vec![f32::NAN; n],
            missing_count: n,
        }
    }

    #[inline]
    pub fn grid(&self) -> &GridStructure {
        &self.grid
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn missing_count(&self) -> usize {
        self.missing_count
    }

    #[inline]
    pub fn informed_count(&self) -> usize {
        self.values.len() - self.missing_count
    }

    /// Value at `si`. Out-of-bounds and dimension-mismatched lookups read
    /// as missing.
    #[inline]
    pub fn get(&self, si: SpatialIndex) -> Option<f32> {
        let idx = self.grid.array_index(si)?;
        self.get_at(idx)
    }

    /// Value at an array position. `idx` must be < `len()`.
    #[inline]
    pub fn get_at(&self, idx: usize) -> Option<f32> {
        let v = self.values[idx];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    #[inline]
    pub fn is_informed(&self, si: SpatialIndex) -> bool {
        self.get(si).is_some()
    }

    /// Set the cell at `si`. Fails on out-of-bounds indices.
    pub fn set(&mut self, si: SpatialIndex, value: f32) -> Result<()> {
        let idx = self
            .grid
            .array_index(si)
            .ok_or_else(|| Error::OutOfRange(format!("spatial index {si:?}")))?;
        self.set_at(idx, value)
    }

    /// Set the cell at an array position. Fails on out-of-range positions
    /// and non-finite values.
    pub fn set_at(&mut self, idx: usize, value: f32) -> Result<()> {
        if idx >= self.values.len() {
            return Err(Error::OutOfRange(format!("array position {idx}")));
        }
        if !value.is_finite() {
            return Err(Error::Precondition(format!(
                "property value must be finite, got {value}"
            )));
        }
        if self.values[idx].is_nan() {
            self.missing_count -= 1;
        }
        self.values[idx] = value;
        Ok(())
    }

    /// Clear the cell at `si` back to missing.
    pub fn set_missing(&mut self, si: SpatialIndex) -> Result<()> {
        let idx = self
            .grid
            .array_index(si)
            .ok_or_else(|| Error::OutOfRange(format!("spatial index {si:?}")))?;
        if !self.values[idx].is_nan() {
            self.missing_count += 1;
        }
        self.values[idx] = f32::NAN;
        Ok(())
    }

    /// Iterate cell values in array order.
    pub fn iter(&self) -> impl Iterator<Item = Option<f32>> + '_ {
        self.values.iter().map(|v| if v.is_nan() { None } else { Some(*v) })
    }
}

/// Bitwise buffer equality on the same grid; missing entries compare equal.
impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()))
    }
}
