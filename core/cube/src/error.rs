//! FILENAME: core/cube/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CubeError {
    #[error("Dimensions cannot be empty")]
    EmptyDimensions,

    #[error("Cube has no root row (a row with no dimension values)")]
    MissingRoot,

    #[error("Cube has {0} root rows; exactly one is required")]
    MultipleRoots(usize),

    #[error("Row at level {level} is deeper than the {max} configured dimensions")]
    RowTooDeep { level: usize, max: usize },

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Rows and slices must all be additive or all be ratio metrics")]
    MixedMetricKinds,
}

pub type Result<T> = std::result::Result<T, CubeError>;
