use crate::error::{Error, Result};
use crate::grid::{Dim, SpatialIndex};
use crate::mould::Mould;
use crate::property::Property;
use crate::sim::driver::Simulator;
use crate::stats;

/// Template parameters of one pyramid level, finest first.
#[derive(Debug, Clone, Copy)]
pub struct Level {
    pub k: usize,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

/// Factor-2 block-mode reduction onto the coarsened grid.
///
/// Each coarse cell takes the mode of the informed values in its source
/// block (smallest category on ties), or stays missing when the whole
/// block is missing. Used both for training-image downsampling and for
/// projecting hard data onto a coarser realization.
pub fn block_mode_downsample(prop: &Property) -> Property {
    let fine = prop.grid();
    let coarse = fine.coarsen();
    let mut out = Property::new(coarse.clone());
    let zspan = match fine.dim() {
        Dim::Two => 1,
        Dim::Three => 2,
    };
    for ci in coarse.cells().collect::<Vec<_>>() {
        let mut block: Vec<f32> = Vec::with_capacity(8);
        for dz in 0..zspan {
            for dy in 0..2 {
                for dx in 0..2 {
                    let si = match fine.dim() {
                        Dim::Two => SpatialIndex::new_2d(ci.ix * 2 + dx, ci.iy * 2 + dy),
                        Dim::Three => {
                            SpatialIndex::new_3d(ci.ix * 2 + dx, ci.iy * 2 + dy, ci.iz * 2 + dz)
                        }
                    };
                    if let Some(v) = prop.get(si) {
                        block.push(v);
                    }
                }
            }
        }
        if let Some(m) = stats::mode(block) {
            // ci is a cell of out's own grid, so the write cannot fail.
            let _ = out.set(ci, m);
        }
    }
    out
}

/// Write the coarse realization into the fine one through the loose
/// center-of-block mapping, never overwriting informed fine cells.
///
/// Coarse cell `i` lands on fine cell `floor((i + 0.5) * fine_n/coarse_n)`
/// along each axis.
pub fn upsample_loose(coarse: &Property, fine: &mut Property) -> Result<()> {
    let cg = coarse.grid();
    let fg = fine.grid().clone();
    if cg.dim() != fg.dim() {
        return Err(Error::GridDimensionMismatch(cg.dim(), fg.dim()));
    }
    let scale = |fine_n: u32, coarse_n: u32, i: i32| -> i32 {
        ((f64::from(i) + 0.5) * f64::from(fine_n) / f64::from(coarse_n)).floor() as i32
    };
    for ci in cg.cells().collect::<Vec<_>>() {
        let Some(v) = coarse.get(ci) else { continue };
        let target = match fg.dim() {
            Dim::Two => SpatialIndex::new_2d(
                scale(fg.nx(), cg.nx(), ci.ix),
                scale(fg.ny(), cg.ny(), ci.iy),
            ),
            Dim::Three => SpatialIndex::new_3d(
                scale(fg.nx(), cg.nx(), ci.ix),
                scale(fg.ny(), cg.ny(), ci.iy),
                scale(fg.nz(), cg.nz(), ci.iz),
            ),
        };
        if !fine.is_informed(target) {
            fine.set(target, v)?;
        }
    }
    Ok(())
}

/// Hierarchical simulation from the coarsest level down to the finest.
///
/// `levels[0]` is the finest; each coarser level works on factor-2
/// reductions of the training image and the hard data. Every level builds
/// its template with multi-grid factor 1 (the pyramid itself supplies the
/// coarsening) and reuses the same seed and switchover.
pub fn simulate_pyramid(
    realization: &Property,
    ti: &Property,
    levels: &[Level],
    theta: f64,
    seed: u32,
) -> Result<Property> {
    if levels.is_empty() {
        return Err(Error::Precondition("at least one pyramid level is required".into()));
    }
    let dim = realization.grid().dim();
    let coarsest = levels.len() - 1;

    let mut tis: Vec<Property> = vec![ti.clone()];
    let mut reals: Vec<Property> = vec![realization.clone()];
    for l in 0..coarsest {
        tis.push(block_mode_downsample(&tis[l]));
        reals.push(block_mode_downsample(&reals[l]));
    }

    for l in (0..=coarsest).rev() {
        let level = &levels[l];
        let mould = Mould::by_anisotropic_topk(level.k, level.rx, level.ry, level.rz, 1, dim)?;
        if l < coarsest {
            let (finer, coarser) = reals.split_at_mut(l + 1);
            upsample_loose(&coarser[0], &mut finer[l])?;
        }
        let sim = Simulator::build(&tis[l], &mould, theta)?;
        sim.run(&mut reals[l], seed)?;
    }
    Ok(reals.swap_remove(0))
}
