use thiserror::Error;

use crate::grid::Dim;

/// Errors raised by the simulation core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("grid dimension mismatch: {0:?} vs {1:?}")]
    GridDimensionMismatch(Dim, Dim),

    #[error("{0} out of range")]
    OutOfRange(String),

    #[error("training image has {0} distinct categories, more than the supported 10")]
    TooManyCategories(usize),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("format error: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
