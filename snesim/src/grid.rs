use crate::error::{Error, Result};

/// Grid dimensionality tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Two,
    Three,
}

/// Continuous world coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Discrete cell index with a dimensionality tag.
///
/// `iz` is carried but ignored in 2D. Components are signed so that
/// template offsets can take an index transiently out of bounds; bounds
/// are checked against a [`GridStructure`], not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialIndex {
    pub ix: i32,
    pub iy: i32,
    pub iz: i32,
    pub dim: Dim,
}

impl SpatialIndex {
    pub fn new_2d(ix: i32, iy: i32) -> Self {
        Self { ix, iy, iz: 0, dim: Dim::Two }
    }

    pub fn new_3d(ix: i32, iy: i32, iz: i32) -> Self {
        Self { ix, iy, iz, dim: Dim::Three }
    }

    /// Component-wise sum; fails when the operands disagree on dimensionality.
    pub fn checked_add(self, other: SpatialIndex) -> Result<SpatialIndex> {
        if self.dim != other.dim {
            return Err(Error::GridDimensionMismatch(self.dim, other.dim));
        }
        Ok(SpatialIndex {
            ix: self.ix + other.ix,
            iy: self.iy + other.iy,
            iz: self.iz + other.iz,
            dim: self.dim,
        })
    }

    /// Component-wise difference; fails when the operands disagree on dimensionality.
    pub fn checked_sub(self, other: SpatialIndex) -> Result<SpatialIndex> {
        if self.dim != other.dim {
            return Err(Error::GridDimensionMismatch(self.dim, other.dim));
        }
        Ok(SpatialIndex {
            ix: self.ix - other.ix,
            iy: self.iy - other.iy,
            iz: self.iz - other.iz,
            dim: self.dim,
        })
    }

    /// Apply a raw offset, keeping the dimensionality tag.
    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> SpatialIndex {
        SpatialIndex {
            ix: self.ix + dx,
            iy: self.iy + dy,
            iz: self.iz + dz,
            dim: self.dim,
        }
    }
}

/// Immutable descriptor of a regular 2D or 3D grid.
///
/// `nz == 1` means 2D. Cells are ordered `ix` fastest, then `iy`, then `iz`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStructure {
    nx: u32,
    ny: u32,
    nz: u32,
    sx: f64,
    sy: f64,
    sz: f64,
    x0: f64,
    y0: f64,
    z0: f64,
}

impl GridStructure {
    /// Create a 2D grid descriptor. Counts must be >= 1 and sizes > 0.
    pub fn new_2d(nx: u32, ny: u32, sx: f64, sy: f64, x0: f64, y0: f64) -> Result<Self> {
        Self::new(nx, ny, 1, sx, sy, 1.0, x0, y0, 0.0)
    }

    /// Create a 3D grid descriptor. Counts must be >= 1 and sizes > 0.
    #[allow(clippy::too_many_arguments)]
    pub fn new_3d(
        nx: u32,
        ny: u32,
        nz: u32,
        sx: f64,
        sy: f64,
        sz: f64,
        x0: f64,
        y0: f64,
        z0: f64,
    ) -> Result<Self> {
        Self::new(nx, ny, nz, sx, sy, sz, x0, y0, z0)
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        nx: u32,
        ny: u32,
        nz: u32,
        sx: f64,
        sy: f64,
        sz: f64,
        x0: f64,
        y0: f64,
        z0: f64,
    ) -> Result<Self> {
        if nx < 1 || ny < 1 || nz < 1 {
            return Err(Error::Precondition(format!(
                "grid counts must be >= 1, got {nx}x{ny}x{nz}"
            )));
        }
        if sx <= 0.0 || sy <= 0.0 || sz <= 0.0 {
            return Err(Error::Precondition(format!(
                "cell sizes must be > 0, got {sx}x{sy}x{sz}"
            )));
        }
        Ok(Self { nx, ny, nz, sx, sy, sz, x0, y0, z0 })
    }

    #[inline]
    pub fn dim(&self) -> Dim {
        if self.nz == 1 {
            Dim::Two
        } else {
            Dim::Three
        }
    }

    #[inline]
    pub fn nx(&self) -> u32 {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> u32 {
        self.ny
    }

    #[inline]
    pub fn nz(&self) -> u32 {
        self.nz
    }

    pub fn cell_sizes(&self) -> (f64, f64, f64) {
        (self.sx, self.sy, self.sz)
    }

    pub fn origin(&self) -> Coord {
        Coord::new(self.x0, self.y0, self.z0)
    }

    /// Total cell count.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nx as usize * self.ny as usize * self.nz as usize
    }

    /// Whether the index lies inside the grid and matches its dimensionality.
    #[inline]
    pub fn contains(&self, si: SpatialIndex) -> bool {
        si.dim == self.dim()
            && si.ix >= 0
            && (si.ix as u32) < self.nx
            && si.iy >= 0
            && (si.iy as u32) < self.ny
            && si.iz >= 0
            && (si.iz as u32) < self.nz
    }

    /// Array position of an index, `ix` fastest. `None` when out of bounds.
    #[inline]
    pub fn array_index(&self, si: SpatialIndex) -> Option<usize> {
        if !self.contains(si) {
            return None;
        }
        let (nx, ny) = (self.nx as usize, self.ny as usize);
        Some(si.iz as usize * nx * ny + si.iy as usize * nx + si.ix as usize)
    }

    /// Spatial index of an array position. `idx` must be < `cell_count()`.
    pub fn spatial_index(&self, idx: usize) -> SpatialIndex {
        assert!(idx < self.cell_count());
        let (nx, ny) = (self.nx as usize, self.ny as usize);
        let iz = (idx / (nx * ny)) as i32;
        let iy = ((idx / nx) % ny) as i32;
        let ix = (idx % nx) as i32;
        match self.dim() {
            Dim::Two => SpatialIndex::new_2d(ix, iy),
            Dim::Three => SpatialIndex::new_3d(ix, iy, iz),
        }
    }

    /// Iterate all indices in array order.
    pub fn cells(&self) -> impl Iterator<Item = SpatialIndex> + '_ {
        (0..self.cell_count()).map(|idx| self.spatial_index(idx))
    }

    /// Center coordinate of the cell at `si`.
    pub fn spatial_index_to_coord(&self, si: SpatialIndex) -> Coord {
        Coord::new(
            self.x0 + f64::from(si.ix) * self.sx,
            self.y0 + f64::from(si.iy) * self.sy,
            self.z0 + f64::from(si.iz) * self.sz,
        )
    }

    /// Index of the nearest cell center, or `None` when the coordinate
    /// falls outside the grid.
    pub fn coord_to_spatial_index(&self, c: Coord) -> Option<SpatialIndex> {
        let ix = ((c.x - self.x0) / self.sx).round() as i32;
        let iy = ((c.y - self.y0) / self.sy).round() as i32;
        let iz = match self.dim() {
            Dim::Two => 0,
            Dim::Three => ((c.z - self.z0) / self.sz).round() as i32,
        };
        let si = match self.dim() {
            Dim::Two => SpatialIndex::new_2d(ix, iy),
            Dim::Three => SpatialIndex::new_3d(ix, iy, iz),
        };
        self.contains(si).then_some(si)
    }

    /// Factor-2 coarsening along x and y (and z in 3D).
    ///
    /// Coarse cell `i` covers fine cells `2i` and `2i+1`; the coarse origin
    /// sits at the centroid of the first block.
    pub fn coarsen(&self) -> GridStructure {
        let half = |n: u32| n.div_ceil(2);
        let (nz, sz, z0) = match self.dim() {
            Dim::Two => (1, self.sz, self.z0),
            Dim::Three => (half(self.nz), self.sz * 2.0, self.z0 + self.sz / 2.0),
        };
        GridStructure {
            nx: half(self.nx),
            ny: half(self.ny),
            nz,
            sx: self.sx * 2.0,
            sy: self.sy * 2.0,
            sz,
            x0: self.x0 + self.sx / 2.0,
            y0: self.y0 + self.sy / 2.0,
            z0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(GridStructure::new_2d(0, 4, 1.0, 1.0, 0.0, 0.0).is_err());
        assert!(GridStructure::new_2d(4, 4, 0.0, 1.0, 0.0, 0.0).is_err());
        assert!(GridStructure::new_3d(4, 4, 4, 1.0, 1.0, -1.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn array_index_is_ix_fastest() {
        let g = GridStructure::new_3d(3, 4, 5, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(g.array_index(SpatialIndex::new_3d(0, 0, 0)), Some(0));
        assert_eq!(g.array_index(SpatialIndex::new_3d(1, 0, 0)), Some(1));
        assert_eq!(g.array_index(SpatialIndex::new_3d(0, 1, 0)), Some(3));
        assert_eq!(g.array_index(SpatialIndex::new_3d(0, 0, 1)), Some(12));
        assert_eq!(g.array_index(SpatialIndex::new_3d(2, 3, 4)), Some(59));
    }

    #[test]
    fn spatial_index_round_trips_array_index() {
        let g = GridStructure::new_3d(3, 4, 5, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0).unwrap();
        for idx in 0..g.cell_count() {
            assert_eq!(g.array_index(g.spatial_index(idx)), Some(idx));
        }
    }

    #[test]
    fn out_of_bounds_and_dim_mismatch_are_not_contained() {
        let g = GridStructure::new_2d(4, 4, 1.0, 1.0, 0.0, 0.0).unwrap();
        assert!(!g.contains(SpatialIndex::new_2d(-1, 0)));
        assert!(!g.contains(SpatialIndex::new_2d(4, 0)));
        assert!(!g.contains(SpatialIndex::new_3d(1, 1, 0)));
        assert!(g.contains(SpatialIndex::new_2d(3, 3)));
    }

    #[test]
    fn checked_arithmetic_requires_matching_dims() {
        let a = SpatialIndex::new_2d(1, 2);
        let b = SpatialIndex::new_3d(1, 2, 3);
        assert!(a.checked_add(b).is_err());
        let c = a.checked_add(SpatialIndex::new_2d(2, -1)).unwrap();
        assert_eq!(c, SpatialIndex::new_2d(3, 1));
        let d = c.checked_sub(a).unwrap();
        assert_eq!(d, SpatialIndex::new_2d(2, -1));
    }

    #[test]
    fn coord_round_trips_for_all_cells() {
        let g = GridStructure::new_2d(5, 7, 2.0, 0.5, 10.0, -3.0).unwrap();
        for si in g.cells().collect::<Vec<_>>() {
            let c = g.spatial_index_to_coord(si);
            assert_eq!(g.coord_to_spatial_index(c), Some(si));
        }
    }

    #[test]
    fn coord_rounds_to_nearest_center() {
        let g = GridStructure::new_2d(4, 4, 1.0, 1.0, 0.0, 0.0).unwrap();
        let si = g.coord_to_spatial_index(Coord::new(1.4, 2.6, 0.0)).unwrap();
        assert_eq!(si, SpatialIndex::new_2d(1, 3));
        assert!(g.coord_to_spatial_index(Coord::new(9.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn coarsen_halves_counts_and_doubles_sizes() {
        let g = GridStructure::new_2d(16, 9, 1.0, 2.0, 0.0, 0.0).unwrap();
        let c = g.coarsen();
        assert_eq!((c.nx(), c.ny(), c.nz()), (8, 5, 1));
        assert_eq!(c.cell_sizes(), (2.0, 4.0, 1.0));
        assert_eq!(c.origin(), Coord::new(0.5, 1.0, 0.0));
        assert_eq!(c.dim(), Dim::Two);
    }

    #[test]
    fn structural_equality() {
        let a = GridStructure::new_2d(4, 4, 1.0, 1.0, 0.0, 0.0).unwrap();
        let b = GridStructure::new_2d(4, 4, 1.0, 1.0, 0.0, 0.0).unwrap();
        let c = GridStructure::new_2d(4, 4, 1.0, 1.0, 0.5, 0.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
