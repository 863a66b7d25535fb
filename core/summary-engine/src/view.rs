//! FILENAME: core/summary-engine/src/view.rs
//! Summary View - the display-ready output of a summary computation.
//!
//! Percentages are rounded to four decimals. Statistics that would divide by
//! zero are NaN (serialized as `null` by JSON writers).

use cube::{DimNameValueCostEntry, DimensionCost};
use serde::{Deserialize, Serialize};

/// One row of the nested summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponseRow {
    /// One entry per displayed level: a dimension value, `(ALL)`, `(ALL)-`
    /// or an empty string.
    pub names: Vec<String>,
    pub baseline_value: f64,
    pub current_value: f64,
    pub change_percentage: f64,
    pub size_factor: f64,
    pub contribution_change_percentage: f64,
    pub contribution_to_overall_change_percentage: f64,
    pub cost: f64,
    /// Child values that are folded into this row (at most 10).
    pub other_dimension_values: Vec<String>,
    /// How many further child values were left out of `other_dimension_values`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_other_dimension_number: Option<usize>,
}

/// One entry of the top gainer or top loser list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryGainerLoserRow {
    pub dimension_name: String,
    pub dimension_value: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub size_factor: f64,
    pub change_percentage: f64,
    pub contribution_change_percentage: f64,
    pub contribution_to_overall_change_percentage: f64,
    pub cost: f64,
}

/// Complete result of one summary computation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionAnalysisResult {
    pub baseline_total: f64,
    pub current_total: f64,
    pub baseline_total_size: f64,
    pub current_total_size: f64,
    /// current_total / baseline_total, rounded to four decimals.
    pub global_ratio: f64,
    /// Header: dimension names up to the level count used.
    pub dimensions: Vec<String>,
    pub response_rows: Vec<SummaryResponseRow>,
    pub gainer: Vec<SummaryGainerLoserRow>,
    pub loser: Vec<SummaryGainerLoserRow>,
    /// Single-dimension slices sorted by cost, largest first.
    pub dimension_costs: Vec<DimNameValueCostEntry>,
    /// Slice costs summed per dimension, largest first.
    pub dimension_cost_totals: Vec<DimensionCost>,
}
