//! FILENAME: core/summary-engine/src/report.rs
//! Report Assembler - turns the ordered answer into display rows.
//!
//! Name tags: every row starts as `(ALL)` at every displayed level and is
//! overwritten with the node's own values. A row that has a descendant in
//! the answer shows `(ALL)-` at its own level ("everything else") and blanks
//! the positions after it.

use cube::{compare_f64, CubeTree, DimNameValueCostEntry, NodeId, ALL, EMPTY, NOT_ALL};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::response_tree::SortedResponse;
use crate::view::{DimensionAnalysisResult, SummaryGainerLoserRow, SummaryResponseRow};

pub const MAX_GAINER_LOSER_COUNT: usize = 5;

/// Number of folded child values listed on a row.
pub const MAX_OTHER_DIMENSION_VALUES: usize = 10;

// ============================================================================
// STATISTICS
// ============================================================================

/// Rounds half up to four decimals: `floor(x * 10000 + 0.5) / 10000`.
///
/// Ties go towards positive infinity, so `0.00005` becomes `0.0001` and
/// `-0.00005` becomes `-0.0`.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0 + 0.5).floor() / 10_000.0
}

/// Change in percent, NaN if the baseline is zero.
pub fn compute_percentage_change(baseline: f64, current: f64) -> f64 {
    if baseline != 0.0 {
        round4((current - baseline) / baseline * 100.0)
    } else {
        f64::NAN
    }
}

/// Change of the slice's share of the total, in percentage points. NaN if
/// either total is zero.
pub fn compute_contribution_change(baseline: f64, current: f64, baseline_total: f64, current_total: f64) -> f64 {
    if current_total != 0.0 && baseline_total != 0.0 {
        round4((current / current_total - baseline / baseline_total) * 100.0)
    } else {
        f64::NAN
    }
}

/// The slice's change relative to the absolute overall change, in percent.
/// NaN if the baseline total is zero.
pub fn compute_contribution_to_overall_change(
    baseline: f64,
    current: f64,
    baseline_total: f64,
    current_total: f64,
) -> f64 {
    if baseline_total != 0.0 {
        round4((current - baseline) / (current_total - baseline_total).abs() * 100.0)
    } else {
        f64::NAN
    }
}

// ============================================================================
// NAME TAGS
// ============================================================================

#[derive(Debug, Clone)]
struct NameTag {
    names: SmallVec<[String; 4]>,
}

impl NameTag {
    fn new(level_count: usize) -> Self {
        NameTag {
            names: (0..level_count).map(|_| ALL.to_string()).collect(),
        }
    }

    fn copy_names(&mut self, values: &[String]) {
        for (name, value) in self.names.iter_mut().zip(values) {
            name.clone_from(value);
        }
    }

    fn set_not_all(&mut self, index: usize) {
        if let Some(name) = self.names.get_mut(index) {
            *name = NOT_ALL.to_string();
        }
    }

    fn set_empty(&mut self, index: usize) {
        if let Some(name) = self.names.get_mut(index) {
            *name = EMPTY.to_string();
        }
    }
}

/// Values of the node's tree children, in child order, without duplicates
/// or blank values.
fn children_names(tree: &CubeTree, node: NodeId) -> Vec<String> {
    let level = tree.level(node);
    let mut names: Vec<String> = Vec::new();
    for &child in tree.children(node) {
        if let Some(value) = tree.dimension_values(child).get(level) {
            if !value.trim().is_empty() && !names.iter().any(|n| n == value) {
                names.push(value.to_string());
            }
        }
    }
    names
}

// ============================================================================
// ROWS
// ============================================================================

/// Fills header and response rows of `result` from the ordered answer.
///
/// `result` must already carry the global totals.
pub fn build_diff_summary(
    result: &mut DimensionAnalysisResult,
    tree: &CubeTree,
    sorted: &SortedResponse,
    target_level_count: usize,
) {
    let nodes = &sorted.nodes;
    let mut name_tags: FxHashMap<NodeId, NameTag> = FxHashMap::default();
    let mut other_values: FxHashMap<NodeId, Vec<String>> = FxHashMap::default();
    for &node in nodes {
        let mut tag = NameTag::new(target_level_count);
        tag.copy_names(tree.dimension_values(node).values());
        name_tags.insert(node, tag);
        other_values.insert(node, children_names(tree, node));
    }

    // Parents precede their children in `nodes`.
    for &node in nodes {
        let mut ancestor = tree.parent(node);
        while let Some(parent) = ancestor {
            if let Some(parent_tag) = name_tags.get_mut(&parent) {
                let not_all_level = tree.level(parent);
                parent_tag.set_not_all(not_all_level);
                for i in not_all_level + 1..target_level_count {
                    parent_tag.set_empty(i);
                }
                if let (Some(others), Some(value)) = (
                    other_values.get_mut(&parent),
                    tree.dimension_values(node).get(not_all_level),
                ) {
                    others.retain(|v| v != value);
                }
                break;
            }
            ancestor = tree.parent(parent);
        }
    }

    let total_size = result.baseline_total_size + result.current_total_size;
    for &node in nodes {
        let cube_node = tree.node(node);
        let baseline_value = cube_node.baseline_value();
        let current_value = cube_node.current_value();
        let mut others = other_values.remove(&node).unwrap_or_default();
        let more_other_dimension_number = if others.len() > MAX_OTHER_DIMENSION_VALUES {
            let more = others.len() - MAX_OTHER_DIMENSION_VALUES;
            others.truncate(MAX_OTHER_DIMENSION_VALUES);
            Some(more)
        } else {
            None
        };
        let names = name_tags
            .remove(&node)
            .map(|tag| tag.names.into_vec())
            .unwrap_or_default();

        result.response_rows.push(SummaryResponseRow {
            names,
            baseline_value,
            current_value,
            change_percentage: compute_percentage_change(baseline_value, current_value),
            size_factor: (cube_node.baseline_size() + cube_node.current_size()) / total_size,
            contribution_change_percentage: compute_contribution_change(
                baseline_value,
                current_value,
                result.baseline_total,
                result.current_total,
            ),
            contribution_to_overall_change_percentage: compute_contribution_to_overall_change(
                baseline_value,
                current_value,
                result.baseline_total,
                result.current_total,
            ),
            cost: sorted.cost_of(tree, node),
            other_dimension_values: others,
            more_other_dimension_number,
        });
    }
}

// ============================================================================
// GAINERS / LOSERS
// ============================================================================

pub fn build_gainer_loser_row(result: &DimensionAnalysisResult, entry: &DimNameValueCostEntry) -> SummaryGainerLoserRow {
    SummaryGainerLoserRow {
        dimension_name: entry.dimension_name.clone(),
        dimension_value: entry.dimension_value.clone(),
        baseline_value: entry.baseline_value,
        current_value: entry.current_value,
        size_factor: entry.size_factor,
        change_percentage: compute_percentage_change(entry.baseline_value, entry.current_value),
        contribution_change_percentage: compute_contribution_change(
            entry.baseline_value,
            entry.current_value,
            result.baseline_total,
            result.current_total,
        ),
        contribution_to_overall_change_percentage: compute_contribution_to_overall_change(
            entry.baseline_value,
            entry.current_value,
            result.baseline_total,
            result.current_total,
        ),
        cost: round4(entry.cost),
    }
}

/// Picks the top gainers and losers from a cost-sorted slice list.
/// Entries with a cost of zero or less are ignored.
pub fn build_gainer_loser_group(result: &mut DimensionAnalysisResult, cost_set: &[DimNameValueCostEntry]) {
    for entry in cost_set {
        if compare_f64(entry.cost, 0.0).is_le() {
            continue;
        }
        if entry.current_value >= entry.baseline_value {
            if result.gainer.len() < MAX_GAINER_LOSER_COUNT {
                let row = build_gainer_loser_row(result, entry);
                result.gainer.push(row);
            }
        } else if entry.current_value < entry.baseline_value && result.loser.len() < MAX_GAINER_LOSER_COUNT {
            let row = build_gainer_loser_row(result, entry);
            result.loser.push(row);
        }
        if result.gainer.len() >= MAX_GAINER_LOSER_COUNT && result.loser.len() >= MAX_GAINER_LOSER_COUNT {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube::{DimensionValues, NodeValues};

    fn entry(value: &str, baseline: f64, current: f64, cost: f64) -> DimNameValueCostEntry {
        DimNameValueCostEntry {
            dimension_name: "country".to_string(),
            dimension_value: value.to_string(),
            baseline_value: baseline,
            current_value: current,
            baseline_size: baseline,
            current_size: current,
            size_factor: 0.1,
            cost,
        }
    }

    fn totals() -> DimensionAnalysisResult {
        DimensionAnalysisResult {
            baseline_total: 1000.0,
            current_total: 1200.0,
            baseline_total_size: 1000.0,
            current_total_size: 1200.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_round4_is_half_up() {
        assert_eq!(round4(0.03125), 0.0313);
        assert_eq!(round4(-0.03125), -0.0312);
        assert_eq!(round4(12.34564), 12.3456);
        assert_eq!(round4(-1.5), -1.5);
        assert!(round4(f64::NAN).is_nan());
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(compute_percentage_change(100.0, 150.0), 50.0);
        assert_eq!(compute_percentage_change(3.0, 2.0), -33.3333);
        assert!(compute_percentage_change(0.0, 50.0).is_nan());
        assert_eq!(compute_percentage_change(-10.0, -5.0), -50.0);
    }

    #[test]
    fn test_contribution_statistics() {
        assert_eq!(compute_contribution_change(100.0, 300.0, 1000.0, 1200.0), 15.0);
        assert!(compute_contribution_change(100.0, 300.0, 0.0, 1200.0).is_nan());
        assert!(compute_contribution_change(100.0, 300.0, 1000.0, 0.0).is_nan());

        assert_eq!(compute_contribution_to_overall_change(100.0, 300.0, 1000.0, 1200.0), 100.0);
        assert_eq!(compute_contribution_to_overall_change(300.0, 250.0, 1000.0, 800.0), -25.0);
        assert!(compute_contribution_to_overall_change(1.0, 2.0, 0.0, 5.0).is_nan());
    }

    #[test]
    fn test_gainer_loser_disjoint_and_capped() {
        let mut cost_set = Vec::new();
        for i in 0..8 {
            cost_set.push(entry(&format!("up{}", i), 10.0, 20.0, 10.0 - i as f64));
            cost_set.push(entry(&format!("down{}", i), 20.0, 10.0, 9.5 - i as f64));
        }
        cost_set.push(entry("zero", 10.0, 90.0, 0.0));

        let mut result = totals();
        build_gainer_loser_group(&mut result, &cost_set);

        assert_eq!(result.gainer.len(), MAX_GAINER_LOSER_COUNT);
        assert_eq!(result.loser.len(), MAX_GAINER_LOSER_COUNT);
        assert!(result.gainer.iter().all(|r| r.current_value >= r.baseline_value));
        assert!(result.loser.iter().all(|r| r.current_value < r.baseline_value));
        assert_eq!(result.gainer[0].dimension_value, "up0");
        assert_eq!(result.loser[4].dimension_value, "down4");
        assert_eq!(result.gainer[0].change_percentage, 100.0);
    }

    #[test]
    fn test_gainer_loser_skips_non_positive_costs() {
        let cost_set = vec![entry("a", 1.0, 2.0, 0.0), entry("b", 2.0, 1.0, -1.0), entry("c", 2.0, 2.0, 0.5)];
        let mut result = totals();
        build_gainer_loser_group(&mut result, &cost_set);
        assert_eq!(result.gainer.len(), 1);
        assert_eq!(result.gainer[0].dimension_value, "c");
        assert!(result.loser.is_empty());
    }

    #[test]
    fn test_name_tags_and_other_values() {
        let mut tree = CubeTree::with_root(NodeValues::additive(1000.0, 1200.0));
        let root = tree.root();
        let us = tree.add_child(root, DimensionValues::new(["US"]), NodeValues::additive(600.0, 800.0));
        let india = tree.add_child(root, DimensionValues::new(["IN"]), NodeValues::additive(400.0, 400.0));
        let us_chrome = tree.add_child(us, DimensionValues::new(["US", "chrome"]), NodeValues::additive(300.0, 500.0));
        tree.add_child(us, DimensionValues::new(["US", "safari"]), NodeValues::additive(300.0, 300.0));
        tree.add_child(india, DimensionValues::new(["IN", "chrome"]), NodeValues::additive(400.0, 400.0));

        let sorted = SortedResponse {
            nodes: vec![root, us, us_chrome],
            costs: FxHashMap::default(),
        };
        let mut result = totals();
        build_diff_summary(&mut result, &tree, &sorted, 2);

        let names: Vec<Vec<String>> = result.response_rows.iter().map(|r| r.names.clone()).collect();
        assert_eq!(
            names,
            vec![
                vec![NOT_ALL.to_string(), EMPTY.to_string()],
                vec!["US".to_string(), NOT_ALL.to_string()],
                vec!["US".to_string(), "chrome".to_string()],
            ]
        );
        assert_eq!(result.response_rows[0].other_dimension_values, vec!["IN".to_string()]);
        assert_eq!(result.response_rows[1].other_dimension_values, vec!["safari".to_string()]);
        assert!(result.response_rows[2].other_dimension_values.is_empty());
        assert_eq!(result.response_rows[1].change_percentage, 33.3333);
    }

    #[test]
    fn test_other_values_are_capped() {
        let mut tree = CubeTree::with_root(NodeValues::additive(120.0, 120.0));
        let root = tree.root();
        for i in 0..12 {
            tree.add_child(root, DimensionValues::new([format!("v{:02}", i)]), NodeValues::additive(10.0, 10.0));
        }
        let sorted = SortedResponse {
            nodes: vec![root],
            costs: FxHashMap::default(),
        };
        let mut result = totals();
        build_diff_summary(&mut result, &tree, &sorted, 1);

        let row = &result.response_rows[0];
        assert_eq!(row.names, vec![ALL.to_string()]);
        assert_eq!(row.other_dimension_values.len(), MAX_OTHER_DIMENSION_VALUES);
        assert_eq!(row.more_other_dimension_number, Some(2));
    }
}
