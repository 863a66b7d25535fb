//! FILENAME: core/summary-engine/src/engine.rs
//! Summary Engine - selects the rows that best explain a cube's change.
//!
//! Algorithm:
//! 1. Walk the cube tree bottom-up, one DP array per level
//! 2. At the deepest level, sweep every child of the current node into the
//!    node's array; above it, recurse into each child and merge the child's
//!    array into the node's array
//! 3. After every insertion, pull the chosen rows' values out of their
//!    parent so the parent only carries what is still unexplained
//! 4. Offer every non-root node itself as a candidate against its parent's
//!    change ratio; rows evicted on the way give their values back to the
//!    nearest chosen ancestor
//! 5. The root's array holds the answer; the response tree and the report
//!    turn it into display rows

use cube::{
    compare_f64, CostFunction, Cube, CubeBuilder, CubeSource, CubeTree, DimensionValues, NodeId, NodeValues,
};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::definition::{effective_level_count, SummaryDefinition};
use crate::dp::{DpArray, InsertPolicy};
use crate::error::{Result, SummaryError};
use crate::report::{build_diff_summary, build_gainer_loser_group, round4};
use crate::response_tree::sort_response_tree;
use crate::view::DimensionAnalysisResult;

/// Relative tolerance for the value-conservation check.
const CONSERVATION_TOLERANCE: f64 = 1e-9;

// ============================================================================
// ROW INSERTION
// ============================================================================

/// Scores rows with the cost function and sweeps them into DP arrays.
struct RowInserter<'a, C: CostFunction> {
    cost_function: &'a C,
    globals: NodeValues,
}

impl<'a, C: CostFunction> RowInserter<'a, C> {
    fn insert(&self, tree: &mut CubeTree, dp: &mut DpArray, node: NodeId, target_ratio: f64, policy: InsertPolicy) {
        match policy {
            InsertPolicy::Plain => self.insert_basic(tree, dp, node, target_ratio),
            InsertPolicy::OneSide { side } => {
                if tree.side(node) == side {
                    self.insert_basic(tree, dp, node, target_ratio);
                } else {
                    // Opposite direction: only below a chosen ancestor on the
                    // same side as the root.
                    let root = tree.root();
                    if let Some(ancestor) = find_ancestor(tree, node, Some(root), dp.answer()) {
                        if tree.side(ancestor) == side {
                            self.insert_basic(tree, dp, node, target_ratio);
                        }
                    }
                }
            }
        }
    }

    fn insert_basic(&self, tree: &mut CubeTree, dp: &mut DpArray, node: NodeId, target_ratio: f64) {
        let values = *tree.node(node).values();
        let cost = self.cost_function.compute_cost(
            target_ratio,
            values.baseline_value(),
            values.current_value(),
            values.baseline_size(),
            values.current_size(),
            self.globals.baseline_value(),
            self.globals.current_value(),
            self.globals.baseline_size(),
            self.globals.current_size(),
        );
        tree.node_mut(node).set_cost(cost);
        dp.sweep(node, cost);
    }

    /// Uses the parent's own ratio when the parent is already chosen,
    /// otherwise `target_ratio` with `policy`.
    fn insert_with_adaptive_ratio(
        &self,
        tree: &mut CubeTree,
        dp: &mut DpArray,
        node: NodeId,
        target_ratio: f64,
        policy: InsertPolicy,
    ) {
        match tree.parent(node) {
            Some(parent) if dp.answer().contains(&parent) => {
                let parent_ratio = tree.safe_change_ratio(parent);
                self.insert_basic(tree, dp, node, parent_ratio);
            }
            _ => self.insert(tree, dp, node, target_ratio, policy),
        }
    }
}

// ============================================================================
// SUMMARIZER
// ============================================================================

/// A value-conservation mismatch found after a summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConservationViolation {
    pub node: NodeId,
    pub dimension_values: DimensionValues,
    pub expected: NodeValues,
    pub actual: NodeValues,
}

impl std::fmt::Display for ConservationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Wrong Wow values at node: {}. Expected: {},{}, actual: {},{}",
            self.dimension_values,
            self.expected.baseline_value(),
            self.expected.current_value(),
            self.actual.baseline_value(),
            self.actual.current_value()
        )
    }
}

/// Runs summaries over one cube. The cube's working values belong to the
/// summarizer for its whole lifetime.
pub struct Summarizer<'a, C: CostFunction> {
    cube: &'a mut Cube,
    inserter: RowInserter<'a, C>,
    level_count: usize,
    dp_arrays: Vec<DpArray>,
    one_side_policy: InsertPolicy,
    leaf_policy: InsertPolicy,
}

impl<'a, C: CostFunction> Summarizer<'a, C> {
    pub fn new(cube: &'a mut Cube, cost_function: &'a C) -> Self {
        let globals = NodeValues::new(
            cube.baseline_total(),
            cube.current_total(),
            cube.baseline_total_size(),
            cube.current_total_size(),
        );
        let level_count = cube.dimensions().len();
        Summarizer {
            cube,
            inserter: RowInserter {
                cost_function,
                globals,
            },
            level_count,
            dp_arrays: Vec::new(),
            one_side_policy: InsertPolicy::Plain,
            leaf_policy: InsertPolicy::Plain,
        }
    }

    /// Computes the summary of at most `answer_size` rows (root included).
    ///
    /// `level_count` of 0 or above the number of dimensions means every
    /// dimension. With `one_side_error`, rows changing against the overall
    /// direction are only shown below a chosen ancestor that follows it.
    pub fn compute_summary(
        &mut self,
        answer_size: usize,
        one_side_error: bool,
        level_count: usize,
    ) -> Result<DimensionAnalysisResult> {
        if answer_size < 1 {
            return Err(SummaryError::InvalidAnswerSize(answer_size));
        }
        let root = self.cube.root();
        if self.cube.root_node().children().is_empty() {
            return Err(SummaryError::NoDataToSummarize);
        }
        let max_level_count = self.cube.dimensions().len();
        self.level_count = effective_level_count(level_count, max_level_count);
        self.cube.reset_working_values();
        self.dp_arrays = (0..self.level_count).map(|_| DpArray::new(answer_size)).collect();

        self.one_side_policy = InsertPolicy::Plain;
        self.leaf_policy = InsertPolicy::Plain;
        if one_side_error {
            let side = compare_f64(1.0, self.cube.tree().safe_change_ratio(root)).is_le();
            self.one_side_policy = InsertPolicy::OneSide { side };
            // With a single dimension the filter applies to the leaves
            // directly; otherwise it acts through the internal nodes.
            if self.level_count == 1 {
                self.leaf_policy = self.one_side_policy;
            }
        }

        self.compute_child_dp_array(root);

        let answer = self.answer();
        if answer.is_empty() {
            return Err(SummaryError::NoDataToSummarize);
        }
        let tree = self.cube.tree();
        debug!("Summary answer has {} rows", answer.len());

        let mut result = DimensionAnalysisResult {
            baseline_total: self.cube.baseline_total(),
            current_total: self.cube.current_total(),
            baseline_total_size: self.cube.baseline_total_size(),
            current_total_size: self.cube.current_total_size(),
            global_ratio: global_ratio(self.cube.baseline_total(), self.cube.current_total()),
            ..Default::default()
        };
        result.dimensions = self.cube.dimensions().names_to_depth(self.level_count).to_vec();

        let max_node_level = answer.iter().map(|id| tree.level(*id)).max().unwrap_or(0);
        let target_level_count = max_node_level.min(self.level_count);
        let sorted = sort_response_tree(tree, &answer, self.inserter.cost_function);
        build_diff_summary(&mut result, tree, &sorted, target_level_count);
        build_gainer_loser_group(&mut result, self.cube.cost_set());
        result.dimension_costs = self.cube.cost_set().to_vec();
        result.dimension_cost_totals = self.cube.sorted_dimension_costs().to_vec();

        for violation in self.conservation_violations() {
            warn!("{}", violation);
        }
        Ok(result)
    }

    /// The cube being summarized, with the working values of the last run.
    pub fn cube(&self) -> &Cube {
        &*self.cube
    }

    /// Nodes chosen by the last run, descendants before their ancestors.
    /// Empty before the first run.
    pub fn answer(&self) -> Vec<NodeId> {
        let Some(top) = self.dp_arrays.first() else {
            return Vec::new();
        };
        let tree = self.cube.tree();
        let mut answer: Vec<NodeId> = top.answer().iter().copied().collect();
        answer.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
        answer
    }

    /// Restores every answer node's values bottom-up through its nearest
    /// chosen ancestor and reports the nodes that do not end up at their
    /// original values. The cube is left untouched.
    pub fn conservation_violations(&self) -> Vec<ConservationViolation> {
        let Some(top) = self.dp_arrays.first() else {
            return Vec::new();
        };
        let tree = self.cube.tree();
        let answer = top.answer();
        let mut nodes: Vec<NodeId> = answer.iter().copied().collect();
        // Descendants sort before their ancestors.
        nodes.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));

        let mut restored: FxHashMap<NodeId, NodeValues> =
            nodes.iter().map(|id| (*id, *tree.node(*id).values())).collect();
        for &node in &nodes {
            if let Some(ancestor) = find_ancestor(tree, node, None, answer) {
                let values = restored[&node];
                if let Some(target) = restored.get_mut(&ancestor) {
                    target.add(&values);
                }
            }
        }

        nodes
            .iter()
            .filter_map(|&node| {
                let expected = *tree.node(node).original_values();
                let actual = restored[&node];
                let conserved = actual
                    .components()
                    .iter()
                    .zip(expected.components())
                    .all(|(a, e)| approx_eq(*a, e));
                (!conserved).then(|| ConservationViolation {
                    node,
                    dimension_values: tree.dimension_values(node).clone(),
                    expected,
                    actual,
                })
            })
            .collect()
    }

    /// Builds the answer of `node`'s subtree into `dp_arrays[level(node)]`.
    fn compute_child_dp_array(&mut self, node: NodeId) {
        let level = self.cube.tree().level(node);
        let parent = self.cube.tree().parent(node);
        let children = self.cube.tree().children(node).to_vec();
        {
            let ratio = self.cube.tree().safe_change_ratio(node);
            let dp = &mut self.dp_arrays[level];
            dp.full_reset();
            dp.target_ratio = ratio;
        }

        if level + 1 == self.level_count {
            for child in children {
                let tree = self.cube.tree_mut();
                let dp = &mut self.dp_arrays[level];
                let ratio = tree.safe_change_ratio(node);
                self.inserter.insert(tree, dp, child, ratio, self.leaf_policy);
                update_wow_values(tree, node, dp.answer());
                dp.target_ratio = tree.safe_change_ratio(node);
            }
        } else {
            for child in children {
                self.compute_child_dp_array(child);
                self.merge_dp_array(node, level);
                let tree = self.cube.tree_mut();
                let dp = &mut self.dp_arrays[level];
                update_wow_values(tree, node, dp.answer());
                dp.target_ratio = tree.safe_change_ratio(node);
            }
        }

        let tree = self.cube.tree_mut();
        let dp = &mut self.dp_arrays[level];
        match parent {
            Some(parent) => {
                update_wow_values(tree, parent, dp.answer());
                let target_ratio = tree.safe_change_ratio(parent);
                recompute_cost_and_remove_small_nodes(&self.inserter, tree, dp, node, target_ratio);
                dp.target_ratio = target_ratio;

                // A node fully explained by its children is not offered.
                if !tree.node(node).is_thinned_out() {
                    if dp.size() == 1 {
                        dp.set_shrink_size(2);
                    }
                    let before = dp.answer().clone();
                    self.inserter.insert_basic(tree, dp, node, target_ratio);
                    let removed: Vec<NodeId> = before
                        .into_iter()
                        .filter(|id| !dp.answer().contains(id))
                        .collect();
                    if !removed.is_empty() {
                        update_wow_values_due_to_removal(tree, Some(node), dp.answer(), removed);
                        update_wow_values(tree, node, dp.answer());
                    }
                }
            }
            None => {
                dp.answer_mut().insert(node);
                if let InsertPolicy::OneSide { side } = self.one_side_policy {
                    remove_opposite_side_rows(tree, dp, node, side);
                }
            }
        }
        debug!(
            "Level {} node {}: {} rows chosen, target ratio {}",
            level,
            tree.dimension_values(node),
            dp.answer().len(),
            dp.target_ratio
        );
    }

    /// Merges `dp_arrays[level + 1]` (a child's subtree) into
    /// `dp_arrays[level]` (the answer of `parent_node` so far).
    fn merge_dp_array(&mut self, parent_node: NodeId, level: usize) {
        let (upper, lower) = self.dp_arrays.split_at_mut(level + 1);
        let parent_array = &mut upper[level];
        let child_array = &lower[0];
        let tree = self.cube.tree_mut();

        let mut removed: FxHashSet<NodeId> = parent_array.answer().clone();
        removed.extend(child_array.answer().iter().copied());

        let target_ratio = (parent_array.target_ratio + child_array.target_ratio) / 2.0;
        recompute_cost_and_remove_small_nodes(&self.inserter, tree, parent_array, parent_node, target_ratio);

        let mut child_nodes: Vec<NodeId> = child_array.answer().iter().copied().collect();
        child_nodes.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
        for child in child_nodes {
            self.inserter
                .insert_with_adaptive_ratio(tree, parent_array, child, target_ratio, self.one_side_policy);
        }

        removed.retain(|id| !parent_array.answer().contains(id));
        update_wow_values_due_to_removal(tree, Some(parent_node), parent_array.answer(), removed.into_iter().collect());
    }
}

// ============================================================================
// HELPER FUNCTIONS (outside impl to avoid borrow issues)
// ============================================================================

fn global_ratio(baseline_total: f64, current_total: f64) -> f64 {
    if baseline_total == 0.0 {
        f64::NAN
    } else {
        round4(current_total / baseline_total)
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    if a == b || (a.is_nan() && b.is_nan()) {
        return true;
    }
    (a - b).abs() <= CONSERVATION_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Closest strict ancestor of `node` in `targets`, searching below `ceiling`
/// (exclusive). With no ceiling the root is searched too.
///
/// # Panics
/// Panics if the search passes the root without meeting `ceiling`.
fn find_ancestor(
    tree: &CubeTree,
    node: NodeId,
    ceiling: Option<NodeId>,
    targets: &FxHashSet<NodeId>,
) -> Option<NodeId> {
    let mut current = node;
    loop {
        match tree.parent(current) {
            Some(parent) if Some(parent) == ceiling => return None,
            Some(parent) => {
                if targets.contains(&parent) {
                    return Some(parent);
                }
                current = parent;
            }
            None => {
                if let Some(ceiling) = ceiling {
                    panic!(
                        "ancestor search from {} passed the root without reaching {}",
                        tree.dimension_values(node),
                        tree.dimension_values(ceiling)
                    );
                }
                return None;
            }
        }
    }
}

/// Resets `node` and pulls out every other chosen row.
fn update_wow_values(tree: &mut CubeTree, node: NodeId, answer: &FxHashSet<NodeId>) {
    tree.reset_values(node);
    for &child in answer {
        if child != node {
            tree.remove_node_values(node, child);
        }
    }
}

/// Gives the values of rows that left the answer back to their nearest
/// chosen ancestor below `ceiling`, deepest rows first.
fn update_wow_values_due_to_removal(
    tree: &mut CubeTree,
    ceiling: Option<NodeId>,
    answer: &FxHashSet<NodeId>,
    mut removed: Vec<NodeId>,
) {
    removed.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
    for node in removed {
        if let Some(ancestor) = find_ancestor(tree, node, ceiling, answer) {
            tree.add_node_values(ancestor, node);
        }
    }
}

/// Whether `node` may stay in an answer restricted to `side`: it follows
/// `side`, its direct parent (other than the root) is chosen, or its nearest
/// chosen ancestor below the root follows `side`.
fn follows_side(tree: &CubeTree, node: NodeId, root: NodeId, side: bool, answer: &FxHashSet<NodeId>) -> bool {
    if tree.side(node) == side {
        return true;
    }
    if let Some(parent) = tree.parent(node) {
        if parent != root && answer.contains(&parent) {
            return true;
        }
    }
    find_ancestor(tree, node, Some(root), answer).is_some_and(|ancestor| tree.side(ancestor) == side)
}

/// Drops the rows of the final answer that no longer follow `side`,
/// deepest first. Values handed back by evicted children can flip a row's
/// direction after it was chosen. A dropped row gives its values to its
/// nearest chosen ancestor, which may flip in turn, so the check repeats
/// until every remaining row passes.
fn remove_opposite_side_rows(tree: &mut CubeTree, dp: &mut DpArray, root: NodeId, side: bool) {
    loop {
        let mut nodes: Vec<NodeId> = dp.answer().iter().copied().filter(|id| *id != root).collect();
        nodes.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
        let Some(node) = nodes
            .into_iter()
            .find(|id| !follows_side(tree, *id, root, side, dp.answer()))
        else {
            return;
        };
        debug!("Dropping {}: it goes against the overall change", tree.dimension_values(node));
        dp.answer_mut().remove(&node);
        update_wow_values_due_to_removal(tree, None, dp.answer(), vec![node]);
    }
}

/// Re-sweeps the answer of `dp` against `target_ratio`. Rows that do not
/// survive hand their values back to the nearest chosen ancestor, with
/// `parent_node` standing in as a chosen ancestor during the hand-back.
fn recompute_cost_and_remove_small_nodes<C: CostFunction>(
    inserter: &RowInserter<'_, C>,
    tree: &mut CubeTree,
    dp: &mut DpArray,
    parent_node: NodeId,
    target_ratio: f64,
) {
    let mut removed: FxHashSet<NodeId> = dp.answer().clone();
    let mut answer: Vec<NodeId> = removed.iter().copied().collect();
    answer.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
    dp.reset();
    for node in answer {
        inserter.insert_with_adaptive_ratio(tree, dp, node, target_ratio, InsertPolicy::Plain);
    }

    removed.retain(|id| !dp.answer().contains(id));
    if !removed.is_empty() {
        dp.answer_mut().insert(parent_node);
        let ceiling = tree.parent(parent_node);
        update_wow_values_due_to_removal(tree, ceiling, dp.answer(), removed.into_iter().collect());
        dp.answer_mut().remove(&parent_node);
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Computes the summary of `cube`.
/// This is the main entry point for the summary engine.
pub fn compute_summary<C: CostFunction>(
    cube: &mut Cube,
    cost_function: &C,
    answer_size: usize,
    one_side_error: bool,
    level_count: usize,
) -> Result<DimensionAnalysisResult> {
    let mut summarizer = Summarizer::new(cube, cost_function);
    summarizer.compute_summary(answer_size, one_side_error, level_count)
}

/// Builds the cube described by `source` and computes its summary.
pub fn calculate_summary_from_source<C: CostFunction>(
    source: CubeSource,
    cost_function: &C,
    definition: &SummaryDefinition,
) -> Result<DimensionAnalysisResult> {
    definition.validate()?;
    let mut cube = CubeBuilder::from_source(source).build(cost_function)?;
    debug!("Restored Cube:\n{}", cube);
    calculate_summary(&mut cube, cost_function, definition)
}

/// Computes the summary described by `definition`.
pub fn calculate_summary<C: CostFunction>(
    cube: &mut Cube,
    cost_function: &C,
    definition: &SummaryDefinition,
) -> Result<DimensionAnalysisResult> {
    definition.validate()?;
    compute_summary(
        cube,
        cost_function,
        definition.answer_size,
        definition.one_side_error,
        definition.level_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube::{BalancedCostFunction, CubeBuilder, CubeRow, Dimensions};

    fn one_dimension_cube() -> Cube {
        CubeBuilder::new(Dimensions::new(["country"]))
            .rows(vec![
                CubeRow::new(Vec::<String>::new(), 1000.0, 1200.0),
                CubeRow::new(["A"], 200.0, 500.0),
                CubeRow::new(["B"], 200.0, 400.0),
                CubeRow::new(["C"], 600.0, 300.0),
            ])
            .build(&BalancedCostFunction::new(0.0))
            .unwrap()
    }

    fn first_names(result: &DimensionAnalysisResult) -> Vec<String> {
        result.response_rows.iter().map(|r| r.names[0].clone()).collect()
    }

    #[test]
    fn test_find_ancestor() {
        let cube = CubeBuilder::new(Dimensions::new(["a", "b"]))
            .rows(vec![
                CubeRow::new(Vec::<String>::new(), 10.0, 10.0),
                CubeRow::new(["x"], 10.0, 10.0),
                CubeRow::new(["x", "y"], 10.0, 10.0),
            ])
            .build(&BalancedCostFunction::default())
            .unwrap();
        let tree = cube.tree();
        let root = tree.root();
        let x = tree.children(root)[0];
        let xy = tree.children(x)[0];

        let mut targets = FxHashSet::default();
        targets.insert(root);
        assert_eq!(find_ancestor(tree, xy, None, &targets), Some(root));
        assert_eq!(find_ancestor(tree, xy, Some(root), &targets), None);
        targets.insert(x);
        assert_eq!(find_ancestor(tree, xy, None, &targets), Some(x));
        assert_eq!(find_ancestor(tree, xy, Some(x), &targets), None);
    }

    #[test]
    #[should_panic(expected = "passed the root")]
    fn test_find_ancestor_panics_past_root() {
        let cube = one_dimension_cube();
        let tree = cube.tree();
        let children = tree.children(tree.root()).to_vec();
        find_ancestor(tree, children[0], Some(children[1]), &FxHashSet::default());
    }

    #[test]
    fn test_invalid_answer_size() {
        let mut cube = one_dimension_cube();
        let err = compute_summary(&mut cube, &BalancedCostFunction::new(0.0), 0, false, 0).unwrap_err();
        assert_eq!(err, SummaryError::InvalidAnswerSize(0));
    }

    #[test]
    fn test_cube_without_dimension_rows() {
        let mut cube = CubeBuilder::new(Dimensions::new(["country"]))
            .row(CubeRow::new(Vec::<String>::new(), 10.0, 20.0))
            .build(&BalancedCostFunction::default())
            .unwrap();
        let err = compute_summary(&mut cube, &BalancedCostFunction::default(), 3, false, 0).unwrap_err();
        assert_eq!(err, SummaryError::NoDataToSummarize);
    }

    #[test]
    fn test_answer_size_one_is_root_only() {
        let mut cube = one_dimension_cube();
        let result = compute_summary(&mut cube, &BalancedCostFunction::new(0.0), 1, false, 0).unwrap();
        assert_eq!(result.response_rows.len(), 1);
        let row = &result.response_rows[0];
        assert!(row.names.is_empty());
        assert_eq!(row.baseline_value, 1000.0);
        assert_eq!(row.current_value, 1200.0);
        assert_eq!(result.global_ratio, 1.2);
    }

    #[test]
    fn test_two_sided_picks_largest_deviations() {
        let mut cube = one_dimension_cube();
        let result = compute_summary(&mut cube, &BalancedCostFunction::new(0.0), 3, false, 1).unwrap();
        assert_eq!(result.response_rows.len(), 3);
        let names = first_names(&result);
        assert_eq!(names[0], cube::NOT_ALL);
        assert!(names.contains(&"C".to_string()));
        assert!(names.contains(&"A".to_string()));
    }

    #[test]
    fn test_one_side_error_hides_opposite_direction() {
        let mut cube = one_dimension_cube();
        let result = compute_summary(&mut cube, &BalancedCostFunction::new(0.0), 3, true, 1).unwrap();
        let names = first_names(&result);
        assert!(!names.contains(&"C".to_string()));
        assert!(names.contains(&"A".to_string()));
        assert!(names.contains(&"B".to_string()));
    }

    #[test]
    fn test_summary_conserves_values() {
        let mut cube = one_dimension_cube();
        let cost_function = BalancedCostFunction::new(0.0);
        let mut summarizer = Summarizer::new(&mut cube, &cost_function);
        summarizer.compute_summary(3, false, 0).unwrap();
        assert!(summarizer.conservation_violations().is_empty());
    }

    #[test]
    fn test_summary_is_repeatable() {
        let mut cube = one_dimension_cube();
        let cost_function = BalancedCostFunction::new(0.0);
        let first = compute_summary(&mut cube, &cost_function, 3, false, 0).unwrap();
        let second = compute_summary(&mut cube, &cost_function, 3, false, 0).unwrap();
        assert_eq!(first.response_rows, second.response_rows);
    }

    #[test]
    fn test_global_ratio_with_zero_baseline() {
        assert!(global_ratio(0.0, 10.0).is_nan());
        assert_eq!(global_ratio(3.0, 4.0), 1.3333);
    }

    /// root 100 -> 120 with A (50 -> 40), A/x below A and B (50 -> 80).
    fn opposite_side_tree(a_x: NodeValues) -> (CubeTree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = CubeTree::with_root(NodeValues::additive(100.0, 120.0));
        let root = tree.root();
        let a = tree.add_child(root, DimensionValues::new(["A"]), NodeValues::additive(50.0, 40.0));
        let a_x_id = tree.add_child(a, DimensionValues::new(["A", "x"]), a_x);
        let b = tree.add_child(root, DimensionValues::new(["B"]), NodeValues::additive(50.0, 80.0));
        (tree, root, a, a_x_id, b)
    }

    fn chosen(tree: &mut CubeTree, nodes: &[NodeId]) -> DpArray {
        let mut dp = DpArray::new(nodes.len());
        for &node in nodes {
            dp.answer_mut().insert(node);
        }
        // Working values as left by the bottom-up pass: every chosen row
        // carries what none of its chosen descendants explain.
        for &node in nodes {
            tree.reset_values(node);
        }
        let mut ordered = nodes.to_vec();
        ordered.sort_by(|a, b| tree.dimension_values(*a).cmp(tree.dimension_values(*b)));
        for &node in &ordered {
            let mut ancestor = tree.parent(node);
            while let Some(id) = ancestor {
                if dp.answer().contains(&id) {
                    tree.remove_node_values(id, node);
                }
                ancestor = tree.parent(id);
            }
        }
        dp
    }

    #[test]
    fn test_row_flipped_by_its_children_is_dropped() {
        // A/x grew, so A without it (30 -> 10) shrank while the total grew.
        let (mut tree, root, a, a_x, b) = opposite_side_tree(NodeValues::additive(20.0, 30.0));
        let mut dp = chosen(&mut tree, &[root, a, a_x, b]);
        assert!(!tree.side(a));

        remove_opposite_side_rows(&mut tree, &mut dp, root, true);

        let mut expected = FxHashSet::default();
        expected.extend([root, a_x, b]);
        assert_eq!(dp.answer(), &expected);
        // A's share went back to the root.
        assert_eq!(tree.node(root).values(), &NodeValues::additive(30.0, 10.0));
    }

    #[test]
    fn test_row_below_a_chosen_parent_is_kept() {
        // A/x shrank, A without it (30 -> 30) is flat and stays chosen.
        let (mut tree, root, a, a_x, b) = opposite_side_tree(NodeValues::additive(20.0, 10.0));
        let mut dp = chosen(&mut tree, &[root, a, a_x, b]);
        assert!(!tree.side(a_x));

        remove_opposite_side_rows(&mut tree, &mut dp, root, true);
        assert_eq!(dp.answer().len(), 4);
    }

    #[test]
    fn test_summary_from_source() {
        let source = CubeSource {
            dimensions: Dimensions::new(["country"]),
            rows: vec![
                CubeRow::new(Vec::<String>::new(), 1000.0, 1200.0),
                CubeRow::new(["A"], 200.0, 500.0),
                CubeRow::new(["B"], 800.0, 700.0),
            ],
            dimension_slices: None,
        };
        let definition = SummaryDefinition::new(2, false, 0);
        let result = calculate_summary_from_source(source.clone(), &BalancedCostFunction::new(0.0), &definition).unwrap();
        assert_eq!(result.response_rows.len(), 2);

        let mut rootless = source;
        rootless.rows.remove(0);
        let err = calculate_summary_from_source(rootless, &BalancedCostFunction::new(0.0), &definition).unwrap_err();
        assert_eq!(err, SummaryError::Cube(cube::CubeError::MissingRoot));
    }
}
