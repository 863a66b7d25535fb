//! FILENAME: core/cube/src/cost.rs
//! Cost functions - score how far a node's change deviates from a target ratio.
//!
//! The summary engine only depends on the [`CostFunction`] contract. The
//! [`BalancedCostFunction`] is the default implementation used by the CLI.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Default minimum share (in percent) of the global size a node needs before
/// its deviation is counted.
pub const DEFAULT_MIN_CONTRIBUTION_PERCENTAGE: f64 = 3.0;

/// Deviation assigned to a slice that is empty on one side (appeared or vanished).
const EMPTY_SIDE_DEVIATION: f64 = 10.0;

// ============================================================================
// ORDERING
// ============================================================================

/// Total order over f64 in which NaN (of either sign) is greater than every
/// other value, including +inf. Two NaNs compare equal.
///
/// Costs are compared with this everywhere, so a NaN cost always ranks as
/// the worst possible cost and comparisons never panic.
pub fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

/// Scores how well a node's observed change matches `target_ratio`.
///
/// Implementations must be deterministic and side-effect free. The cost is 0
/// when `current_value / baseline_value == target_ratio` and grows with both
/// the deviation and the node's share of the global totals.
pub trait CostFunction {
    #[allow(clippy::too_many_arguments)]
    fn compute_cost(
        &self,
        target_ratio: f64,
        baseline_value: f64,
        current_value: f64,
        baseline_size: f64,
        current_size: f64,
        global_baseline_value: f64,
        global_current_value: f64,
        global_baseline_size: f64,
        global_current_size: f64,
    ) -> f64;
}

impl<F: CostFunction + ?Sized> CostFunction for &F {
    fn compute_cost(
        &self,
        target_ratio: f64,
        baseline_value: f64,
        current_value: f64,
        baseline_size: f64,
        current_size: f64,
        global_baseline_value: f64,
        global_current_value: f64,
        global_baseline_size: f64,
        global_current_size: f64,
    ) -> f64 {
        (**self).compute_cost(
            target_ratio,
            baseline_value,
            current_value,
            baseline_size,
            current_size,
            global_baseline_value,
            global_current_value,
            global_baseline_size,
            global_current_size,
        )
    }
}

// ============================================================================
// BALANCED COST FUNCTION
// ============================================================================

/// Contribution-weighted absolute log deviation.
///
/// `cost = contribution * |ln(current / (target_ratio * baseline))|` where
/// `contribution = (baseline_size + current_size) / (global sizes)`. Nodes
/// smaller than `min_contribution_percentage` of the global size cost nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancedCostFunction {
    /// Minimum contribution (percent of the global size) to be scored at all.
    pub min_contribution_percentage: f64,
}

impl Default for BalancedCostFunction {
    fn default() -> Self {
        BalancedCostFunction {
            min_contribution_percentage: DEFAULT_MIN_CONTRIBUTION_PERCENTAGE,
        }
    }
}

impl BalancedCostFunction {
    pub fn new(min_contribution_percentage: f64) -> Self {
        BalancedCostFunction {
            min_contribution_percentage,
        }
    }

    fn contribution(
        baseline_size: f64,
        current_size: f64,
        global_baseline_size: f64,
        global_current_size: f64,
    ) -> f64 {
        let total = global_baseline_size + global_current_size;
        if total == 0.0 || !total.is_finite() {
            return 0.0;
        }
        ((baseline_size + current_size) / total).abs()
    }

    fn deviation(baseline_value: f64, current_value: f64, target_ratio: f64) -> f64 {
        if baseline_value == 0.0 && current_value == 0.0 {
            return 0.0;
        }
        if baseline_value == 0.0 || current_value == 0.0 {
            return EMPTY_SIDE_DEVIATION.ln();
        }
        let expected = target_ratio * baseline_value;
        let ratio = current_value / expected;
        if !ratio.is_finite() || ratio <= 0.0 {
            // Sign flip between expectation and observation.
            return EMPTY_SIDE_DEVIATION.ln();
        }
        ratio.ln().abs()
    }
}

impl CostFunction for BalancedCostFunction {
    fn compute_cost(
        &self,
        target_ratio: f64,
        baseline_value: f64,
        current_value: f64,
        baseline_size: f64,
        current_size: f64,
        _global_baseline_value: f64,
        _global_current_value: f64,
        global_baseline_size: f64,
        global_current_size: f64,
    ) -> f64 {
        let contribution = Self::contribution(
            baseline_size,
            current_size,
            global_baseline_size,
            global_current_size,
        );
        if contribution * 100.0 < self.min_contribution_percentage {
            return 0.0;
        }
        let target_ratio = if target_ratio.is_finite() && target_ratio > 0.0 {
            target_ratio
        } else {
            1.0
        };
        contribution * Self::deviation(baseline_value, current_value, target_ratio)
    }
}
