use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::grid::{Dim, GridStructure, SpatialIndex};
use crate::rng::Prng;

/// Progress is pinned below this until every entry is frozen, so that
/// threshold comparisons never see an early 100%.
const PROGRESS_CLAMP: f64 = 99.99;

/// Randomized visiting order over a grid with per-entry freezing.
#[derive(Debug)]
pub struct SimulationPath {
    cells: Vec<SpatialIndex>,
    frozen: Vec<bool>,
    slot_of: HashMap<usize, usize>,
    frozen_count: usize,
    cursor: usize,
}

impl SimulationPath {
    /// Shuffled path over every cell of `grid`.
    pub fn new(grid: &GridStructure, rng: &mut Prng) -> Self {
        Self::build(grid, 1, rng)
    }

    /// Shuffled path over the sub-grid with the given stride along each
    /// axis (`2^(g-1)` for multi-grid level `g`).
    pub fn with_stride(grid: &GridStructure, stride: u32, rng: &mut Prng) -> Result<Self> {
        if stride < 1 {
            return Err(Error::Precondition("path stride must be >= 1".into()));
        }
        Ok(Self::build(grid, stride, rng))
    }

    fn build(grid: &GridStructure, stride: u32, rng: &mut Prng) -> Self {
        let step = stride as usize;
        let mut cells = Vec::new();
        let zs: Vec<i32> = match grid.dim() {
            Dim::Two => vec![0],
            Dim::Three => (0..grid.nz() as i32).step_by(step).collect(),
        };
        for &iz in &zs {
            for iy in (0..grid.ny() as i32).step_by(step) {
                for ix in (0..grid.nx() as i32).step_by(step) {
                    cells.push(match grid.dim() {
                        Dim::Two => SpatialIndex::new_2d(ix, iy),
                        Dim::Three => SpatialIndex::new_3d(ix, iy, iz),
                    });
                }
            }
        }

        // Fisher-Yates, high to low.
        for i in (1..cells.len()).rev() {
            let j = rng.next_in_range(0, i + 1);
            cells.swap(i, j);
        }

        let mut slot_of = HashMap::with_capacity(cells.len());
        for (slot, &si) in cells.iter().enumerate() {
            if let Some(idx) = grid.array_index(si) {
                slot_of.insert(idx, slot);
            }
        }
        let n = cells.len();
        Self {
            cells,
            frozen: vec![false; n],
            slot_of,
            frozen_count: 0,
            cursor: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn frozen_count(&self) -> usize {
        self.frozen_count
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.frozen_count == self.cells.len()
    }

    /// Freeze the slot holding the cell with grid array index `idx`.
    ///
    /// Returns whether the slot transitioned to frozen; cells not on the
    /// path (or already frozen) are left alone.
    pub fn freeze(&mut self, idx: usize) -> bool {
        match self.slot_of.get(&idx) {
            Some(&slot) if !self.frozen[slot] => {
                self.frozen[slot] = true;
                self.frozen_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Advance past frozen entries and return the next cell, freezing it.
    /// `None` once the path is exhausted.
    pub fn visit_next(&mut self) -> Option<SpatialIndex> {
        while self.cursor < self.cells.len() {
            let slot = self.cursor;
            self.cursor += 1;
            if self.frozen[slot] {
                continue;
            }
            self.frozen[slot] = true;
            self.frozen_count += 1;
            return Some(self.cells[slot]);
        }
        None
    }

    /// Frozen percentage, clamped below 100 until every entry is frozen.
    pub fn progress(&self) -> f64 {
        if self.is_complete() {
            return 100.0;
        }
        let pct = 100.0 * self.frozen_count as f64 / self.cells.len() as f64;
        pct.min(PROGRESS_CLAMP)
    }
}
