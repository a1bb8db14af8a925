//! Discrete sampling from a weighted value sequence.

use crate::error::{Error, Result};

/// Sample the value whose normalized cumulative interval contains `p`.
///
/// Weights must be non-negative with a positive total; `p` is expected in
/// `[0, 1)`. Numerical drift that pushes `p` past the last interval falls
/// back to the last value.
pub fn sample_cdf<T: Copy>(entries: &[(T, f64)], p: f64) -> Result<T> {
    if entries.is_empty() {
        return Err(Error::Precondition("sampler input is empty".into()));
    }
    let mut total = 0.0;
    for &(_, w) in entries {
        if w < 0.0 {
            return Err(Error::Precondition(format!("negative sampler weight {w}")));
        }
        total += w;
    }
    if total <= 0.0 {
        return Err(Error::Precondition(
            "sampler weights must have a positive total".into(),
        ));
    }

    let mut acc = 0.0;
    for &(v, w) in entries {
        acc += w;
        if p < acc / total {
            return Ok(v);
        }
    }
    Ok(entries[entries.len() - 1].0)
}
