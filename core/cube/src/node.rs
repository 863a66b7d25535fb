//! FILENAME: core/cube/src/node.rs
//! Cube Tree - arena of aggregate nodes linked by index.
//!
//! Every node is one (partial) combination of dimension values. Nodes live in
//! a flat `Vec` and refer to each other through [`NodeId`]; the parent link is
//! a plain back reference and children are owned by the arena.
//!
//! Each node carries two copies of its aggregates:
//! - `original`: the values delivered by the cube builder (never mutated)
//! - working values: mutated while the summary engine folds chosen
//!   descendants in and out of the answer
//!
//! One arena serves one summary computation at a time. Call
//! [`CubeTree::reset_working_values`] before reusing it.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::cost::compare_f64;
use crate::dimensions::DimensionValues;

/// Index of a node inside its [`CubeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// NODE VALUES
// ============================================================================

/// Tolerance used when ratio parts are compared against zero or each other.
const RATIO_EPSILON: f64 = 0.0001;

fn fuzzy_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= RATIO_EPSILON
}

fn fuzzy_compare(a: f64, b: f64) -> Ordering {
    if fuzzy_eq(a, b) {
        Ordering::Equal
    } else {
        compare_f64(a, b)
    }
}

/// Baseline/current aggregates of a slice of the data.
///
/// Additive metrics carry their values and sizes directly; for a plain sum
/// the size equals the value. Ratio metrics (e.g. observed over expected)
/// carry numerator and denominator sums, so moving a slice in or out of a
/// node moves both parts and the ratio is recomputed from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeValues {
    Additive {
        baseline_value: f64,
        current_value: f64,
        baseline_size: f64,
        current_size: f64,
    },
    Ratio {
        baseline_numerator: f64,
        current_numerator: f64,
        baseline_denominator: f64,
        current_denominator: f64,
    },
}

impl Default for NodeValues {
    fn default() -> Self {
        NodeValues::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl NodeValues {
    pub fn new(baseline_value: f64, current_value: f64, baseline_size: f64, current_size: f64) -> Self {
        NodeValues::Additive {
            baseline_value,
            current_value,
            baseline_size,
            current_size,
        }
    }

    /// Values of an additive metric, where size and value coincide.
    pub fn additive(baseline_value: f64, current_value: f64) -> Self {
        NodeValues::new(baseline_value, current_value, baseline_value, current_value)
    }

    pub fn ratio(
        baseline_numerator: f64,
        current_numerator: f64,
        baseline_denominator: f64,
        current_denominator: f64,
    ) -> Self {
        NodeValues::Ratio {
            baseline_numerator,
            current_numerator,
            baseline_denominator,
            current_denominator,
        }
    }

    /// Zeroed values of the same kind as `self`.
    pub fn empty_like(&self) -> Self {
        match self {
            NodeValues::Additive { .. } => NodeValues::new(0.0, 0.0, 0.0, 0.0),
            NodeValues::Ratio { .. } => NodeValues::ratio(0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn is_ratio(&self) -> bool {
        matches!(self, NodeValues::Ratio { .. })
    }

    /// The four accumulated quantities, in declaration order.
    pub fn components(&self) -> [f64; 4] {
        match *self {
            NodeValues::Additive {
                baseline_value,
                current_value,
                baseline_size,
                current_size,
            } => [baseline_value, current_value, baseline_size, current_size],
            NodeValues::Ratio {
                baseline_numerator,
                current_numerator,
                baseline_denominator,
                current_denominator,
            } => [baseline_numerator, current_numerator, baseline_denominator, current_denominator],
        }
    }

    fn combine(&mut self, other: &NodeValues, sign: f64) {
        let parts = other.components();
        match (self, other) {
            (
                NodeValues::Additive {
                    baseline_value,
                    current_value,
                    baseline_size,
                    current_size,
                },
                NodeValues::Additive { .. },
            ) => {
                *baseline_value += sign * parts[0];
                *current_value += sign * parts[1];
                *baseline_size += sign * parts[2];
                *current_size += sign * parts[3];
            }
            (
                NodeValues::Ratio {
                    baseline_numerator,
                    current_numerator,
                    baseline_denominator,
                    current_denominator,
                },
                NodeValues::Ratio { .. },
            ) => {
                *baseline_numerator += sign * parts[0];
                *current_numerator += sign * parts[1];
                *baseline_denominator += sign * parts[2];
                *current_denominator += sign * parts[3];
            }
            _ => panic!("additive and ratio values cannot be combined"),
        }
    }

    /// # Panics
    /// Panics when the two values are of different kinds.
    pub fn add(&mut self, other: &NodeValues) {
        self.combine(other, 1.0);
    }

    /// # Panics
    /// Panics when the two values are of different kinds.
    pub fn subtract(&mut self, other: &NodeValues) {
        self.combine(other, -1.0);
    }

    /// Value of one ratio side. A zero denominator with a zero numerator
    /// reads as 0 (missing); with a non-zero numerator the numerator is
    /// spread over the node size to keep the change bounded.
    fn ratio_value(&self, numerator: f64, denominator: f64) -> f64 {
        if !fuzzy_eq(denominator, 0.0) {
            numerator / denominator
        } else if fuzzy_eq(numerator, 0.0) {
            0.0
        } else {
            numerator / self.total_size()
        }
    }

    pub fn baseline_value(&self) -> f64 {
        match *self {
            NodeValues::Additive { baseline_value, .. } => baseline_value,
            NodeValues::Ratio {
                baseline_numerator,
                baseline_denominator,
                ..
            } => self.ratio_value(baseline_numerator, baseline_denominator),
        }
    }

    pub fn current_value(&self) -> f64 {
        match *self {
            NodeValues::Additive { current_value, .. } => current_value,
            NodeValues::Ratio {
                current_numerator,
                current_denominator,
                ..
            } => self.ratio_value(current_numerator, current_denominator),
        }
    }

    /// For ratios: numerator + denominator.
    pub fn baseline_size(&self) -> f64 {
        match *self {
            NodeValues::Additive { baseline_size, .. } => baseline_size,
            NodeValues::Ratio {
                baseline_numerator,
                baseline_denominator,
                ..
            } => baseline_numerator + baseline_denominator,
        }
    }

    pub fn current_size(&self) -> f64 {
        match *self {
            NodeValues::Additive { current_size, .. } => current_size,
            NodeValues::Ratio {
                current_numerator,
                current_denominator,
                ..
            } => current_numerator + current_denominator,
        }
    }

    /// current / baseline; IEEE semantics when a divisor is zero.
    pub fn change_ratio(&self) -> f64 {
        match *self {
            NodeValues::Additive {
                baseline_value,
                current_value,
                ..
            } => current_value / baseline_value,
            NodeValues::Ratio {
                baseline_numerator,
                current_numerator,
                baseline_denominator,
                current_denominator,
            } => (current_numerator / current_denominator) / (baseline_numerator / baseline_denominator),
        }
    }

    pub fn total_size(&self) -> f64 {
        self.baseline_size() + self.current_size()
    }
}

// ============================================================================
// CUBE NODE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CubeNode {
    level: usize,
    dimension_values: DimensionValues,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    values: NodeValues,
    original: NodeValues,
    cost: f64,
}

impl CubeNode {
    fn new(level: usize, dimension_values: DimensionValues, parent: Option<NodeId>, values: NodeValues) -> Self {
        CubeNode {
            level,
            dimension_values,
            parent,
            children: Vec::new(),
            values,
            original: values,
            cost: 0.0,
        }
    }

    /// Level of the node; 0 is the root.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn dimension_values(&self) -> &DimensionValues {
        &self.dimension_values
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Working values (what is left unexplained at this node).
    pub fn values(&self) -> &NodeValues {
        &self.values
    }

    pub fn original_values(&self) -> &NodeValues {
        &self.original
    }

    pub fn baseline_value(&self) -> f64 {
        self.values.baseline_value()
    }

    pub fn current_value(&self) -> f64 {
        self.values.current_value()
    }

    pub fn baseline_size(&self) -> f64 {
        self.values.baseline_size()
    }

    pub fn current_size(&self) -> f64 {
        self.values.current_size()
    }

    /// The last cost computed for this node during selection.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.cost = cost;
    }

    pub fn change_ratio(&self) -> f64 {
        self.values.change_ratio()
    }

    pub fn original_change_ratio(&self) -> f64 {
        self.original.change_ratio()
    }

    /// Direction of an additive deviation: true when the change ratio is
    /// >= 1. Falls back to the original ratio when the working ratio is NaN.
    fn additive_side(&self) -> bool {
        let ratio = self.change_ratio();
        let ratio = if ratio.is_nan() { self.original_change_ratio() } else { ratio };
        // NaN ranks above every number, so an undefined ratio counts as "up".
        compare_f64(1.0, ratio).is_le()
    }

    /// Whether every descendant's size has been pulled out of this node.
    pub fn is_thinned_out(&self) -> bool {
        self.values.baseline_size() == 0.0 && self.values.current_size() == 0.0
    }
}

// ============================================================================
// CUBE TREE
// ============================================================================

/// Arena holding every node of the cube; index 0 is the root.
#[derive(Debug, Clone, Default)]
pub struct CubeTree {
    nodes: Vec<CubeNode>,
}

impl CubeTree {
    /// Creates a tree holding only the root node.
    pub fn with_root(values: NodeValues) -> Self {
        CubeTree {
            nodes: vec![CubeNode::new(0, DimensionValues::root(), None, values)],
        }
    }

    /// Appends a child under `parent` and returns its id.
    ///
    /// # Panics
    /// Panics if `parent` is not in the tree or if `dimension_values` does
    /// not extend the parent's values by exactly one position.
    pub fn add_child(&mut self, parent: NodeId, dimension_values: DimensionValues, values: NodeValues) -> NodeId {
        let parent_node = self.node(parent);
        let level = parent_node.level + 1;
        assert!(
            dimension_values.len() == level && parent_node.dimension_values.is_ancestor_of(&dimension_values),
            "{} is not a child of {}",
            dimension_values,
            parent_node.dimension_values
        );
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CubeNode::new(level, dimension_values, Some(parent), values));
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    /// Panics on an id that does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &CubeNode {
        self.nodes
            .get(id.index())
            .unwrap_or_else(|| panic!("node {:?} is not part of the cube tree", id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CubeNode {
        self.nodes
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("node {:?} is not part of the cube tree", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CubeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn level(&self, id: NodeId) -> usize {
        self.node(id).level
    }

    pub fn dimension_values(&self, id: NodeId) -> &DimensionValues {
        &self.node(id).dimension_values
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Orders every child list by total size, largest first (stable).
    ///
    /// Parents are updated whenever a child is extracted, and large children
    /// are less disturbed by small ones, so large slices go first.
    pub fn sort_children_by_size(&mut self) {
        for i in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[i].children);
            children.sort_by(|a, b| {
                let size_a = self.nodes[a.index()].original.total_size();
                let size_b = self.nodes[b.index()].original.total_size();
                compare_f64(size_b, size_a)
            });
            self.nodes[i].children = children;
        }
    }

    /// Change ratio that is always finite and non-zero.
    ///
    /// Tries the working ratio, then the original ratio, then the parent's
    /// safe ratio, then 1.0 at the root. Borrowed ratios are flipped to the
    /// node's own direction of change.
    pub fn safe_change_ratio(&self, id: NodeId) -> f64 {
        let node = self.node(id);
        let ratio = node.change_ratio();
        if ratio.is_finite() && ratio != 0.0 {
            return ratio;
        }
        let ratio = node.original_change_ratio();
        if ratio.is_finite() && ratio != 0.0 {
            return ensure_change_ratio_direction(node.baseline_size(), node.current_size(), ratio);
        }
        match node.parent {
            Some(parent) => ensure_change_ratio_direction(
                node.baseline_size(),
                node.current_size(),
                self.safe_change_ratio(parent),
            ),
            None => 1.0,
        }
    }

    /// Direction of the node's deviation: true when it grew or stayed flat.
    ///
    /// Ratio nodes compare their two values with a small tolerance. When one
    /// side is (close to) zero the node is judged against its parent's value
    /// on the other side, and a node with both sides at zero follows its
    /// parent.
    pub fn side(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if !node.values.is_ratio() {
            return node.additive_side();
        }
        let current = node.current_value();
        let baseline = node.baseline_value();
        let current_zero = fuzzy_eq(current, 0.0);
        let baseline_zero = fuzzy_eq(baseline, 0.0);
        if !current_zero && !baseline_zero {
            return fuzzy_compare(current, baseline).is_ge();
        }
        match node.parent {
            Some(parent) if current_zero && baseline_zero => self.side(parent),
            Some(parent) if current_zero => fuzzy_compare(baseline, self.node(parent).baseline_value()).is_lt(),
            Some(parent) => fuzzy_compare(current, self.node(parent).current_value()).is_ge(),
            None => fuzzy_compare(current, baseline).is_ge(),
        }
    }

    /// Restores the working values of `id` from its original snapshot.
    pub fn reset_values(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.values = node.original;
    }

    /// Extracts the working values of `source` from `target`.
    pub fn remove_node_values(&mut self, target: NodeId, source: NodeId) {
        let values = self.node(source).values;
        self.node_mut(target).values.subtract(&values);
    }

    /// Adds the working values of `source` back into `target`.
    pub fn add_node_values(&mut self, target: NodeId, source: NodeId) {
        let values = self.node(source).values;
        self.node_mut(target).values.add(&values);
    }

    /// Restores every node's working values and clears all costs.
    pub fn reset_working_values(&mut self) {
        for node in &mut self.nodes {
            node.values = node.original;
            node.cost = 0.0;
        }
    }
}

/// Mirrors a borrowed ratio across 1.0 when it points the opposite way of the
/// node's own change (e.g. a node that grew must not get a ratio below 1).
pub fn ensure_change_ratio_direction(baseline: f64, current: f64, ratio: f64) -> f64 {
    let grew = current > baseline;
    let shrank = current < baseline;
    if ((grew && ratio < 1.0) || (shrank && ratio > 1.0)) && ratio != 0.0 {
        1.0 / ratio
    } else {
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (CubeTree, NodeId, NodeId, NodeId) {
        let mut tree = CubeTree::with_root(NodeValues::additive(30.0, 45.0));
        let root = tree.root();
        let us = tree.add_child(root, DimensionValues::new(["US"]), NodeValues::additive(20.0, 30.0));
        let india = tree.add_child(root, DimensionValues::new(["IN"]), NodeValues::additive(10.0, 15.0));
        (tree, root, us, india)
    }

    #[test]
    fn test_links_and_levels() {
        let (tree, root, us, india) = sample_tree();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children(root), &[us, india]);
        assert_eq!(tree.parent(us), Some(root));
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.level(india), 1);
    }

    #[test]
    #[should_panic(expected = "is not a child of")]
    fn test_add_child_rejects_wrong_depth() {
        let (mut tree, root, _, _) = sample_tree();
        tree.add_child(root, DimensionValues::new(["US", "page1"]), NodeValues::default());
    }

    #[test]
    fn test_remove_and_add_values_round_trip() {
        let (mut tree, root, us, _) = sample_tree();
        tree.remove_node_values(root, us);
        assert_eq!(tree.node(root).baseline_value(), 10.0);
        assert_eq!(tree.node(root).current_size(), 15.0);
        assert_eq!(tree.node(root).original_values().baseline_value(), 30.0);

        tree.add_node_values(root, us);
        assert_eq!(tree.node(root).values(), &NodeValues::additive(30.0, 45.0));
    }

    #[test]
    fn test_thinned_out_after_all_children_removed() {
        let (mut tree, root, us, india) = sample_tree();
        tree.remove_node_values(root, us);
        tree.remove_node_values(root, india);
        assert!(tree.node(root).is_thinned_out());

        tree.reset_working_values();
        assert!(!tree.node(root).is_thinned_out());
    }

    #[test]
    fn test_safe_change_ratio_fallbacks() {
        let mut tree = CubeTree::with_root(NodeValues::additive(100.0, 150.0));
        let root = tree.root();
        let fresh = tree.add_child(root, DimensionValues::new(["new"]), NodeValues::additive(0.0, 50.0));
        let gone = tree.add_child(root, DimensionValues::new(["gone"]), NodeValues::additive(40.0, 0.0));

        // Infinite ratio borrows the parent's 1.5, which already points up.
        assert_eq!(tree.safe_change_ratio(fresh), 1.5);
        // Zero ratio borrows 1.5 and flips it because the node shrank.
        assert!((tree.safe_change_ratio(gone) - 1.0 / 1.5).abs() < 1e-12);
        assert_eq!(tree.safe_change_ratio(root), 1.5);
    }

    #[test]
    fn test_side() {
        let mut tree = CubeTree::with_root(NodeValues::additive(100.0, 100.0));
        let root = tree.root();
        let down = tree.add_child(root, DimensionValues::new(["a"]), NodeValues::additive(10.0, 5.0));
        let empty = tree.add_child(root, DimensionValues::new(["b"]), NodeValues::additive(0.0, 0.0));
        assert!(tree.side(root));
        assert!(!tree.side(down));
        assert!(tree.side(empty));
    }

    #[test]
    fn test_sort_children_by_size() {
        let mut tree = CubeTree::with_root(NodeValues::additive(10.0, 10.0));
        let root = tree.root();
        let small = tree.add_child(root, DimensionValues::new(["s"]), NodeValues::additive(1.0, 1.0));
        let big = tree.add_child(root, DimensionValues::new(["b"]), NodeValues::additive(6.0, 6.0));
        let mid = tree.add_child(root, DimensionValues::new(["m"]), NodeValues::additive(3.0, 3.0));
        tree.sort_children_by_size();
        assert_eq!(tree.children(root), &[big, mid, small]);
    }

    #[test]
    fn test_ratio_values() {
        let values = NodeValues::ratio(10.0, 20.0, 100.0, 100.0);
        assert_eq!(values.baseline_value(), 0.1);
        assert_eq!(values.current_value(), 0.2);
        assert_eq!(values.baseline_size(), 110.0);
        assert_eq!(values.current_size(), 120.0);
        assert_eq!(values.change_ratio(), 2.0);

        let missing = NodeValues::ratio(0.0, 0.0, 0.0, 0.0);
        assert_eq!(missing.baseline_value(), 0.0);
        assert_eq!(missing.current_value(), 0.0);

        // Numerator without denominator is spread over the node size.
        let spread = NodeValues::ratio(5.0, 0.0, 0.0, 15.0);
        assert_eq!(spread.baseline_value(), 0.25);
        assert_eq!(spread.current_value(), 0.0);
    }

    #[test]
    fn test_ratio_removal_moves_parts() {
        let mut tree = CubeTree::with_root(NodeValues::ratio(30.0, 60.0, 300.0, 300.0));
        let root = tree.root();
        let us = tree.add_child(root, DimensionValues::new(["US"]), NodeValues::ratio(10.0, 40.0, 100.0, 100.0));

        tree.remove_node_values(root, us);
        assert_eq!(tree.node(root).values().components(), [20.0, 20.0, 200.0, 200.0]);
        assert_eq!(tree.node(root).baseline_value(), 0.1);
        assert_eq!(tree.node(root).current_value(), 0.1);

        tree.add_node_values(root, us);
        assert_eq!(tree.node(root).values(), tree.node(root).original_values());
    }

    #[test]
    #[should_panic(expected = "cannot be combined")]
    fn test_mixed_kinds_do_not_combine() {
        let mut values = NodeValues::additive(1.0, 2.0);
        values.add(&NodeValues::ratio(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_ratio_side() {
        let mut tree = CubeTree::with_root(NodeValues::ratio(30.0, 60.0, 300.0, 300.0));
        let root = tree.root();
        let down = tree.add_child(root, DimensionValues::new(["down"]), NodeValues::ratio(10.0, 5.0, 100.0, 100.0));
        let flat = tree.add_child(root, DimensionValues::new(["flat"]), NodeValues::ratio(10.0, 10.00001, 100.0, 100.0));
        let empty = tree.add_child(root, DimensionValues::new(["empty"]), NodeValues::ratio(0.0, 0.0, 0.0, 0.0));
        let gone = tree.add_child(root, DimensionValues::new(["gone"]), NodeValues::ratio(20.0, 0.0, 100.0, 0.0));
        let fresh = tree.add_child(root, DimensionValues::new(["fresh"]), NodeValues::ratio(0.0, 20.0, 0.0, 100.0));

        assert!(tree.side(root));
        assert!(!tree.side(down));
        assert!(tree.side(flat));
        // Both sides missing: follows the parent.
        assert!(tree.side(empty));
        // Only a baseline, above the parent's baseline of 0.1.
        assert!(!tree.side(gone));
        // Only a current value, at the parent's current value of 0.2.
        assert!(tree.side(fresh));
    }
}
