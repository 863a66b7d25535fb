//! FILENAME: core/summary-engine/src/definition.rs
//! Summary Definition - the serializable request parameters.
//!
//! Describes WHAT summary to compute; the cube supplies the data.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};

pub const DEFAULT_ANSWER_SIZE: usize = 10;

/// Parameters of one summary computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryDefinition {
    /// Maximum number of rows in the summary, the root row included.
    pub answer_size: usize,

    /// Number of hierarchy levels to drill into. 0 (or anything larger than
    /// the number of dimensions) means every dimension.
    pub level_count: usize,

    /// Hide explanations whose direction contradicts the overall change
    /// unless a selected ancestor already establishes the same direction.
    pub one_side_error: bool,
}

impl Default for SummaryDefinition {
    fn default() -> Self {
        SummaryDefinition {
            answer_size: DEFAULT_ANSWER_SIZE,
            level_count: 0,
            one_side_error: false,
        }
    }
}

impl SummaryDefinition {
    pub fn new(answer_size: usize, one_side_error: bool, level_count: usize) -> Self {
        SummaryDefinition {
            answer_size,
            level_count,
            one_side_error,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.answer_size < 1 {
            return Err(SummaryError::InvalidAnswerSize(self.answer_size));
        }
        Ok(())
    }

    /// Clamps `level_count` to `1..=max_level_count`; out-of-range values
    /// fall back to the full depth.
    pub fn effective_level_count(&self, max_level_count: usize) -> usize {
        effective_level_count(self.level_count, max_level_count)
    }
}

pub(crate) fn effective_level_count(level_count: usize, max_level_count: usize) -> usize {
    if level_count == 0 || level_count > max_level_count {
        max_level_count
    } else {
        level_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let definition: SummaryDefinition = serde_json::from_str(r#"{"answer_size": 4}"#).unwrap();
        assert_eq!(definition.answer_size, 4);
        assert_eq!(definition.level_count, 0);
        assert!(!definition.one_side_error);
        assert_eq!(SummaryDefinition::default().answer_size, DEFAULT_ANSWER_SIZE);
    }

    #[test]
    fn test_validate_rejects_empty_answer() {
        let definition = SummaryDefinition::new(0, false, 0);
        assert_eq!(definition.validate(), Err(SummaryError::InvalidAnswerSize(0)));
        assert!(SummaryDefinition::new(1, true, 2).validate().is_ok());
    }

    #[test]
    fn test_level_count_clamp() {
        assert_eq!(SummaryDefinition::new(5, false, 0).effective_level_count(3), 3);
        assert_eq!(SummaryDefinition::new(5, false, 7).effective_level_count(3), 3);
        assert_eq!(SummaryDefinition::new(5, false, 2).effective_level_count(3), 2);
    }
}
