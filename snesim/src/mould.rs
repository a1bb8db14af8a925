use crate::error::{Error, Result};
use crate::grid::{Dim, SpatialIndex};
use crate::property::Property;

/// Largest box radius the anisotropic top-K search will grow to.
const MAX_SEARCH_RADIUS: i64 = 1024;

/// Result of gathering a data event around a center cell.
#[derive(Debug, Clone, Copy)]
pub struct Gather {
    /// Value at the center cell itself, if informed.
    pub core: Option<f32>,
    /// At least one neighbor value is informed.
    pub any_valid: bool,
    /// All neighbor values are informed.
    pub all_valid: bool,
}

/// Ordered neighborhood template: center-relative offsets sorted by
/// distance, nearest first.
///
/// Offsets are held in parallel primitive arrays; the dimensionality is a
/// property of the instance, and 2D gathers never touch the z component.
/// The core `(0, 0, 0)` is never a member and entries are pairwise distinct.
#[derive(Debug, Clone)]
pub struct Mould {
    dim: Dim,
    dx: Vec<i32>,
    dy: Vec<i32>,
    dz: Vec<i32>,
    dist: Vec<f64>,
}

impl Mould {
    /// Build a template from the `k` nearest offsets under per-axis scaled
    /// distance `sqrt((x/rx)^2 + (y/ry)^2 + (z/rz)^2)`.
    ///
    /// Candidates are enumerated in a growing axis-aligned box; ties break
    /// lexicographically on `(dx, dy, dz)`. Each kept offset is multiplied
    /// by the multi-grid expansion `2^(g-1)`. The 2D form forces `dz = 0`
    /// and ignores `rz`.
    pub fn by_anisotropic_topk(
        k: usize,
        rx: f64,
        ry: f64,
        rz: f64,
        multigrid: u32,
        dim: Dim,
    ) -> Result<Self> {
        if k == 0 {
            return Err(Error::Precondition("template size K must be > 0".into()));
        }
        if rx <= 0.0 || ry <= 0.0 || (dim == Dim::Three && rz <= 0.0) {
            return Err(Error::Precondition(format!(
                "template ratios must be > 0, got ({rx}, {ry}, {rz})"
            )));
        }
        if multigrid < 1 {
            return Err(Error::Precondition("multi-grid factor must be >= 1".into()));
        }

        // Grow the box until it holds at least k non-center offsets.
        let mut radius: i64 = 1;
        loop {
            let side = 2 * radius + 1;
            let candidates = match dim {
                Dim::Two => side * side - 1,
                Dim::Three => side * side * side - 1,
            };
            if candidates as usize >= k {
                break;
            }
            radius += 1;
            if radius > MAX_SEARCH_RADIUS {
                return Err(Error::Precondition(format!(
                    "template search box exceeded radius {MAX_SEARCH_RADIUS}"
                )));
            }
        }

        let r = radius as i32;
        let zs = match dim {
            Dim::Two => 0..=0,
            Dim::Three => -r..=r,
        };
        let mut scored: Vec<(f64, i32, i32, i32)> = Vec::new();
        for z in zs {
            for y in -r..=r {
                for x in -r..=r {
                    if x == 0 && y == 0 && z == 0 {
                        continue;
                    }
                    let sx = f64::from(x) / rx;
                    let sy = f64::from(y) / ry;
                    let sz = match dim {
                        Dim::Two => 0.0,
                        Dim::Three => f64::from(z) / rz,
                    };
                    let d = (sx * sx + sy * sy + sz * sz).sqrt();
                    scored.push((d, x, y, z));
                }
            }
        }
        scored.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });
        scored.truncate(k);

        let expansion = 1i32 << (multigrid - 1);
        let mut mould = Mould {
            dim,
            dx: Vec::with_capacity(k),
            dy: Vec::with_capacity(k),
            dz: Vec::with_capacity(k),
            dist: Vec::with_capacity(k),
        };
        for (d, x, y, z) in scored {
            mould.dx.push(x * expansion);
            mould.dy.push(y * expansion);
            mould.dz.push(z * expansion);
            mould.dist.push(d);
        }
        Ok(mould)
    }

    /// Build a template from explicit neighbor locations relative to `core`.
    ///
    /// Duplicate offsets and the zero offset are removed; the remainder is
    /// sorted by Euclidean distance with `(dx, dy, dz)` tie-break.
    pub fn by_locations(core: SpatialIndex, neighbors: &[SpatialIndex]) -> Result<Self> {
        let mut offsets: Vec<(i32, i32, i32)> = Vec::with_capacity(neighbors.len());
        for &n in neighbors {
            let o = n.checked_sub(core)?;
            if o.ix == 0 && o.iy == 0 && o.iz == 0 {
                continue;
            }
            offsets.push((o.ix, o.iy, o.iz));
        }
        offsets.sort_unstable();
        offsets.dedup();
        if offsets.is_empty() {
            return Err(Error::Precondition(
                "template needs at least one non-center neighbor".into(),
            ));
        }

        let mut scored: Vec<(f64, i32, i32, i32)> = offsets
            .into_iter()
            .map(|(x, y, z)| {
                let d = (f64::from(x).powi(2) + f64::from(y).powi(2) + f64::from(z).powi(2)).sqrt();
                (d, x, y, z)
            })
            .collect();
        scored.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });

        let mut mould = Mould {
            dim: core.dim,
            dx: Vec::with_capacity(scored.len()),
            dy: Vec::with_capacity(scored.len()),
            dz: Vec::with_capacity(scored.len()),
            dist: Vec::with_capacity(scored.len()),
        };
        for (d, x, y, z) in scored {
            mould.dx.push(x);
            mould.dy.push(y);
            mould.dz.push(z);
            mould.dist.push(d);
        }
        Ok(mould)
    }

    /// Number of neighbors K.
    #[inline]
    pub fn len(&self) -> usize {
        self.dx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> Dim {
        self.dim
    }

    /// Offset of neighbor `i`, nearest first.
    #[inline]
    pub fn offset(&self, i: usize) -> (i32, i32, i32) {
        (self.dx[i], self.dy[i], self.dz[i])
    }

    /// Sorting distance of neighbor `i`.
    #[inline]
    pub fn distance(&self, i: usize) -> f64 {
        self.dist[i]
    }

    /// Read the neighborhood of `center` from `prop` into `buf`.
    ///
    /// `buf[i]` receives the value at `center + offset(i)`, missing when the
    /// neighbor is uninformed or out of bounds. Fails when `center` does not
    /// match the template's dimensionality.
    pub fn gather(
        &self,
        center: SpatialIndex,
        prop: &Property,
        buf: &mut Vec<Option<f32>>,
    ) -> Result<Gather> {
        if center.dim != self.dim {
            return Err(Error::GridDimensionMismatch(center.dim, self.dim));
        }
        buf.clear();
        buf.reserve(self.len());
        let mut any_valid = false;
        let mut all_valid = true;
        match self.dim {
            Dim::Two => {
                for i in 0..self.len() {
                    let v = prop.get(center.offset(self.dx[i], self.dy[i], 0));
                    any_valid |= v.is_some();
                    all_valid &= v.is_some();
                    buf.push(v);
                }
            }
            Dim::Three => {
                for i in 0..self.len() {
                    let v = prop.get(center.offset(self.dx[i], self.dy[i], self.dz[i]));
                    any_valid |= v.is_some();
                    all_valid &= v.is_some();
                    buf.push(v);
                }
            }
        }
        Ok(Gather {
            core: prop.get(center),
            any_valid,
            all_valid,
        })
    }
}
