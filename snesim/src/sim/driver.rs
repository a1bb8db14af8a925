use crate::error::{Error, Result};
use crate::mould::Mould;
use crate::property::Property;
use crate::rng::Prng;
use crate::sampler::sample_cdf;
use crate::sim::path::SimulationPath;
use crate::sim::stree::STree;
use crate::stats;

/// Minimum replicate support a retrieved distribution must exceed.
const CD_MIN: u64 = 1;

/// Single-resolution sequential simulator with a prebuilt pattern index.
///
/// Construction indexes the training image; `run` then fills one
/// realization per call. The tree, the global PDF, and the template are
/// immutable across runs, so one simulator can produce many realizations.
pub struct Simulator {
    tree: STree,
    global_pdf: Vec<(i32, f64)>,
    theta: f64,
}

impl Simulator {
    /// Index `ti` under `mould`. `theta` is the path-progress percentage
    /// at or below which retrieval runs in reverse.
    pub fn build(ti: &Property, mould: &Mould, theta: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&theta) {
            return Err(Error::Precondition(format!(
                "switchover percentage must be in [0, 100], got {theta}"
            )));
        }
        let global_pdf = stats::global_pdf(ti);
        if global_pdf.is_empty() {
            return Err(Error::Precondition(
                "training image has no informed cells".into(),
            ));
        }
        let tree = STree::build(mould, ti)?;
        Ok(Self {
            tree,
            global_pdf,
            theta,
        })
    }

    #[inline]
    pub fn tree(&self) -> &STree {
        &self.tree
    }

    #[inline]
    pub fn global_pdf(&self) -> &[(i32, f64)] {
        &self.global_pdf
    }

    /// Fill every uninformed cell of `realization` along a seeded random
    /// path. Pre-informed cells are frozen up front and never mutated.
    ///
    /// The generator is consumed in a fixed order: the path shuffle first,
    /// then one draw per simulated cell in visit order.
    pub fn run(&self, realization: &mut Property, seed: u32) -> Result<()> {
        let mut rng = Prng::new(seed);
        let mut path = SimulationPath::new(realization.grid(), &mut rng);
        for idx in 0..realization.len() {
            if realization.get_at(idx).is_some() {
                path.freeze(idx);
            }
        }

        let k = self.tree.mould().len();
        let mut buf: Vec<Option<f32>> = Vec::with_capacity(k);
        let mut event: Vec<Option<i32>> = Vec::with_capacity(k);
        let mut cpdf: Vec<(i32, f64)> = Vec::new();

        while let Some(si) = path.visit_next() {
            if realization.is_informed(si) {
                continue;
            }
            let gathered = self.tree.mould().gather(si, realization, &mut buf)?;

            let weights: &[(i32, f64)] = if !gathered.any_valid {
                &self.global_pdf
            } else {
                event.clear();
                event.extend(buf.iter().map(|v| v.map(stats::as_category)));
                let retrieved = if path.progress() <= self.theta {
                    self.tree.retrieve_reverse(&event, CD_MIN)
                } else {
                    self.tree.retrieve_forward(&event, CD_MIN)
                };
                match retrieved {
                    Some(agg) => {
                        cpdf.clear();
                        cpdf.extend(
                            self.tree
                                .categories()
                                .iter()
                                .zip(&agg)
                                .map(|(&c, &n)| (c, n as f64)),
                        );
                        &cpdf
                    }
                    None => &self.global_pdf,
                }
            };

            let p = rng.next_unit_double();
            let value = sample_cdf(weights, p)?;
            realization.set(si, value as f32)?;
        }
        Ok(())
    }
}
