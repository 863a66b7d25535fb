//! FILENAME: core/summary-engine/src/error.rs

use cube::CubeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("answerSize is {0}. Answer size must be >= 1")]
    InvalidAnswerSize(usize),

    #[error("No data to summarize: the answer is empty")]
    NoDataToSummarize,

    #[error("Cube error: {0}")]
    Cube(#[from] CubeError),
}

pub type Result<T> = std::result::Result<T, SummaryError>;
